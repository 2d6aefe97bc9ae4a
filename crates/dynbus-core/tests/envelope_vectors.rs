//! Envelope vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use dynbus_core::protocol::{Envelope, Message, Outcome, RawEnvelope};

mod vector_loader;
use vector_loader::load;

fn kind(msg: &Message) -> &'static str {
    match msg {
        Message::Call(_) => "call",
        Message::Reply(r) => match r.outcome {
            Outcome::Result(_) => "result",
            Outcome::Error(_) => "error",
        },
    }
}

#[test]
fn envelope_vectors() {
    let files = [
        "envelope_call.json",
        "envelope_batch.json",
        "envelope_result.json",
        "envelope_error.json",
        "envelope_control.json",
        "bad_both_outcomes.json",
        "bad_unknown_field.json",
        "bad_empty_batch.json",
        "bad_not_json.json",
    ];

    for f in files {
        let v = load(f);
        let res = Envelope::parse(&v.frame_text());

        if let Some(err) = v.expect_error {
            let e = res.expect_err("expected error");
            assert_eq!(e.client_code().as_str(), err.code, "vector={}", v.description);
            continue;
        }

        let env = res.expect("expected ok envelope");
        let ex = v.expect.expect("missing expect block");

        assert_eq!(env.to.as_deref(), ex["to"].as_str(), "vector={}", v.description);
        assert_eq!(env.from.as_deref(), ex["from"].as_str(), "vector={}", v.description);

        let kinds: Vec<&str> = env.body.messages().iter().map(kind).collect();
        let want: Vec<&str> = ex["kinds"]
            .as_array()
            .unwrap()
            .iter()
            .map(|k| k.as_str().unwrap())
            .collect();
        assert_eq!(kinds, want, "vector={}", v.description);

        let ids: Vec<u64> = ex["request_ids"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i.as_u64().unwrap())
            .collect();
        assert_eq!(env.body.request_ids(), ids, "vector={}", v.description);
    }
}

#[test]
fn decoded_and_raw_views_agree() {
    let v = load("envelope_batch.json");
    let text = v.frame_text();
    let decoded = Envelope::parse(&text).unwrap();
    let raw = RawEnvelope::parse(&text).unwrap();
    assert_eq!(raw.to, decoded.to);
    assert_eq!(raw.body().unwrap(), decoded.body);
}

#[test]
fn reencoded_envelope_parses_back() {
    let v = load("envelope_error.json");
    let env = Envelope::parse(&v.frame_text()).unwrap();
    let again = Envelope::parse(&env.to_json().unwrap()).unwrap();
    assert_eq!(env, again);
}
