#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::time::Duration;

use serde_json::json;

use dynbus_core::DynbusError;
use dynbus_rpc::{args, Returned};

use common::{broker, endpoint, RawNode};

#[tokio::test]
async fn replies_are_matched_by_id_not_by_arrival_order() {
    let b = broker();
    let mut browser = RawNode::attach(&b);
    browser.listen("browser").await;

    let controller = endpoint(&b, None);
    let proxy = controller.connect_to("browser").await.unwrap();

    let calls: Vec<_> = (0..3)
        .map(|i| {
            let proxy = proxy.clone();
            tokio::spawn(async move {
                proxy
                    .invoke_function(None, "echo", args![i * 10])
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut frames = Vec::new();
    for _ in 0..3 {
        frames.push(browser.recv().await);
    }
    for frame in frames.iter().rev() {
        let from = frame["from"].as_str().unwrap();
        browser
            .reply(from, &frame["body"]["id"], frame["body"]["params"][1].clone())
            .await;
    }

    for (i, call) in calls.into_iter().enumerate() {
        assert_eq!(call.await.unwrap(), Returned::Value(json!(i * 10)));
    }
}

#[tokio::test]
async fn pending_calls_fail_when_the_peer_goes_away() {
    let b = broker();
    let mut browser = RawNode::attach(&b);
    browser.listen("browser").await;

    let controller = endpoint(&b, None);
    let proxy = controller.connect_to("browser").await.unwrap();

    let call = tokio::spawn({
        let proxy = proxy.clone();
        async move { proxy.invoke_function(None, "echo", args![1]).await }
    });
    let _ = browser.recv().await;
    drop(browser);

    let res = tokio::time::timeout(Duration::from_secs(2), call)
        .await
        .expect("pending call was not failed")
        .unwrap();
    assert!(matches!(res, Err(DynbusError::ConnectionClosed)), "{res:?}");
    // only the calls to that peer fail; the connection itself stays up
    assert!(!controller.is_closed());
}

#[tokio::test]
async fn closing_the_endpoint_fails_outstanding_requests() {
    let b = broker();
    let mut browser = RawNode::attach(&b);
    browser.listen("browser").await;

    let controller = endpoint(&b, None);
    let proxy = controller.connect_to("browser").await.unwrap();

    let call = tokio::spawn({
        let proxy = proxy.clone();
        async move { proxy.invoke_function(None, "echo", args![1]).await }
    });
    let _ = browser.recv().await;

    controller.close();
    let res = call.await.unwrap();
    assert!(matches!(res, Err(DynbusError::ConnectionClosed)), "{res:?}");

    tokio::time::timeout(Duration::from_secs(1), controller.closed())
        .await
        .expect("closed() did not resolve");

    let again = proxy.invoke_function(None, "echo", args![2]).await;
    assert!(matches!(again, Err(DynbusError::ConnectionClosed)));
}

#[tokio::test]
async fn late_replies_for_unknown_ids_are_ignored() {
    let b = broker();
    let mut browser = RawNode::attach(&b);
    browser.listen("browser").await;

    let controller = endpoint(&b, None);
    let proxy = controller.connect_to("browser").await.unwrap();
    let name = controller.name().unwrap();

    browser.reply(&name, &json!(9999), json!("stray")).await;

    let call = tokio::spawn({
        let proxy = proxy.clone();
        async move { proxy.invoke_function(None, "echo", args!["ok"]).await }
    });
    let frame = browser.recv().await;
    browser
        .reply(&name, &frame["body"]["id"], json!("ok"))
        .await;
    assert_eq!(
        call.await.unwrap().unwrap(),
        Returned::Value(json!("ok"))
    );
}

#[tokio::test]
async fn replies_only_complete_calls_to_the_node_that_sent_them() {
    let b = broker();
    let ctl = endpoint(&b, None);
    ctl.listen("ctl").await.unwrap();
    let mut a = RawNode::attach(&b);
    a.listen("a").await;
    let mut other = RawNode::attach(&b);
    other.listen("b").await;

    let proxy = ctl.proxy("a");
    let call = tokio::spawn(async move { proxy.invoke_function(None, "echo", args!["x"]).await });
    let frame = a.recv().await;
    let id = frame["body"]["id"].clone();

    other.reply("ctl", &id, json!("from-b")).await;
    a.reply("ctl", &id, json!("from-a")).await;

    let res = tokio::time::timeout(Duration::from_secs(2), call)
        .await
        .expect("call never completed")
        .unwrap();
    assert_eq!(res.unwrap(), Returned::Value(json!("from-a")));
}

#[tokio::test]
async fn pending_calls_fail_when_the_peer_name_is_taken_over() {
    let b = broker();
    let mut browser = RawNode::attach(&b);
    browser.listen("browser").await;

    let controller = endpoint(&b, None);
    let proxy = controller.connect_to("browser").await.unwrap();

    let call = tokio::spawn({
        let proxy = proxy.clone();
        async move { proxy.invoke_function(None, "echo", args![1]).await }
    });
    let _ = browser.recv().await;

    let mut successor = RawNode::attach(&b);
    successor.listen("browser").await;

    let res = tokio::time::timeout(Duration::from_secs(2), call)
        .await
        .expect("pending call was not failed")
        .unwrap();
    assert!(matches!(res, Err(DynbusError::ConnectionClosed)), "{res:?}");
    assert!(!controller.is_closed());
}
