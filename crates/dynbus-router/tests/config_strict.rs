#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use dynbus_router::config::{self, AddressingMode, NullDestination, RebindPolicy};

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
router:
  listen: "0.0.0.0:8000"
  rebnd: reject # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "BAD_REQUEST");
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.router.listen, "0.0.0.0:8000");
    assert_eq!(cfg.router.ws_path, "/ws");
    assert_eq!(cfg.router.addressing, AddressingMode::Anchored);
    assert_eq!(cfg.router.null_destination, NullDestination::Reject);
    assert_eq!(cfg.router.rebind, RebindPolicy::Replace);
}

#[test]
fn policies_parse_in_snake_case() {
    let ok = r#"
version: 1
router:
  addressing: explicit
  null_destination: sole_peer
  rebind: reject
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.router.addressing, AddressingMode::Explicit);
    assert_eq!(cfg.router.null_destination, NullDestination::SolePeer);
    assert_eq!(cfg.router.rebind, RebindPolicy::Reject);
}

#[test]
fn wrong_version_is_rejected() {
    let err = config::load_from_str("version: 2\n").expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "UNSUPPORTED_VERSION");
}

#[test]
fn idle_timeout_must_exceed_ping_interval() {
    let bad = r#"
version: 1
router:
  ping_interval_ms: 20000
  idle_timeout_ms: 20000
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "BAD_REQUEST");
}

#[test]
fn frame_limit_is_bounded() {
    let bad = "version: 1\nrouter:\n  max_frame_bytes: 10\n";
    assert!(config::load_from_str(bad).is_err());
}

#[test]
fn delivery_timeout_is_bounded() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.router.delivery_timeout_ms, 5000);
    let bad = "version: 1\nrouter:\n  delivery_timeout_ms: 0\n";
    assert!(config::load_from_str(bad).is_err());
}
