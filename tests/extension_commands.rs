//! End-to-end tests for the `vibium:` extension commands against a
//! scripted mock browser.

mod common;

use std::time::{Duration, Instant};

use serde_json::{json, Value};

use common::{attach_client, MockBrowser, MockOptions};
use vibium::{LaunchOptions, Router};

#[tokio::test]
async fn find_returns_element_info() {
    let mock = MockBrowser::spawn(MockOptions::default()).await;
    let router = Router::new(LaunchOptions::default());
    let mut client = attach_client(&router, 1, &mock.url).await;

    router
        .on_client_message(
            1,
            r#"{"id":2,"method":"vibium:find","params":{"selector":"button"}}"#,
        )
        .await;

    let response = client.recv_response(2).await;
    assert_eq!(response["type"], "success");
    assert_eq!(response["result"]["tag"], "button");
    assert_eq!(response["result"]["text"], "Submit");
    assert_eq!(response["result"]["box"]["width"], 120.0);

    router.on_client_disconnect(1).await;
}

#[tokio::test]
async fn find_times_out_with_exact_error() {
    let mock = MockBrowser::spawn(MockOptions {
        element: None,
        ..MockOptions::default()
    })
    .await;
    let router = Router::new(LaunchOptions::default());
    let mut client = attach_client(&router, 1, &mock.url).await;

    let start = Instant::now();
    router
        .on_client_message(
            1,
            r##"{"id":1,"method":"vibium:find","params":{"selector":"#nope","timeout":300}}"##,
        )
        .await;

    let response = client.recv_response(1).await;
    let elapsed = start.elapsed();

    assert_eq!(
        response,
        json!({
            "id": 1,
            "type": "error",
            "error": {
                "error": "timeout",
                "message": "timeout after 300ms waiting for '#nope': element not found",
            },
        })
    );
    assert!(elapsed >= Duration::from_millis(300), "finished too early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(700), "finished too late: {elapsed:?}");

    router.on_client_disconnect(1).await;
}

#[tokio::test]
async fn find_polls_until_element_appears() {
    let mock = MockBrowser::spawn(MockOptions {
        find_succeeds_after: 3,
        ..MockOptions::default()
    })
    .await;
    let router = Router::new(LaunchOptions::default());
    let mut client = attach_client(&router, 1, &mock.url).await;

    router
        .on_client_message(
            1,
            r#"{"id":4,"method":"vibium:find","params":{"selector":"button","timeout":5000}}"#,
        )
        .await;

    let response = client.recv_response(4).await;
    assert_eq!(response["type"], "success");
    assert_eq!(response["result"]["tag"], "button");

    router.on_client_disconnect(1).await;
}

#[tokio::test]
async fn click_waits_through_load() {
    let mock = MockBrowser::spawn(MockOptions {
        nav_events_on_actions: vec![
            "browsingContext.navigationStarted",
            "browsingContext.domContentLoaded",
            "browsingContext.load",
        ],
        ..MockOptions::default()
    })
    .await;
    let router = Router::new(LaunchOptions::default());
    let mut client = attach_client(&router, 1, &mock.url).await;

    router
        .on_client_message(
            1,
            r#"{"id":7,"method":"vibium:click","params":{"selector":"button[type=submit]"}}"#,
        )
        .await;

    let response = client.recv_response(7).await;
    assert_eq!(
        response,
        json!({"id": 7, "type": "success", "result": {"clicked": true}})
    );

    router.on_client_disconnect(1).await;
}

#[tokio::test]
async fn click_reports_the_stage_that_timed_out() {
    // The mock emits no navigation events; the first wait stage starves.
    let mock = MockBrowser::spawn(MockOptions::default()).await;
    let router = Router::new(LaunchOptions::default());
    let mut client = attach_client(&router, 1, &mock.url).await;

    let start = Instant::now();
    router
        .on_client_message(
            1,
            r#"{"id":3,"method":"vibium:click","params":{"selector":"a","timeout":400}}"#,
        )
        .await;

    let response = client.recv_response(3).await;
    let elapsed = start.elapsed();
    assert_eq!(response["type"], "error");
    assert_eq!(response["error"]["error"], "timeout");
    assert_eq!(
        response["error"]["message"],
        "timeout after 400ms waiting for navigation to start"
    );
    // Element polling plus the enabled wait stage share the one deadline.
    assert!(elapsed < Duration::from_millis(1000), "deadline overshot: {elapsed:?}");

    router.on_client_disconnect(1).await;
}

#[tokio::test]
async fn click_dom_content_loaded_stage_timeout() {
    // navigationStarted arrives, DOMContentLoaded never does.
    let mock = MockBrowser::spawn(MockOptions {
        nav_events_on_actions: vec!["browsingContext.navigationStarted"],
        ..MockOptions::default()
    })
    .await;
    let router = Router::new(LaunchOptions::default());
    let mut client = attach_client(&router, 1, &mock.url).await;

    router
        .on_client_message(
            1,
            r#"{"id":5,"method":"vibium:click","params":{"selector":"a","timeout":400,"waitBehavior":"waitForDomContentLoaded"}}"#,
        )
        .await;

    let response = client.recv_response(5).await;
    assert_eq!(
        response["error"]["message"],
        "timeout after 400ms waiting for DOMContentLoaded"
    );

    router.on_client_disconnect(1).await;
}

#[tokio::test]
async fn click_with_none_policy_skips_the_wait() {
    // No events ever arrive, yet the click resolves immediately.
    let mock = MockBrowser::spawn(MockOptions::default()).await;
    let router = Router::new(LaunchOptions::default());
    let mut client = attach_client(&router, 1, &mock.url).await;

    let start = Instant::now();
    router
        .on_client_message(
            1,
            r#"{"id":8,"method":"vibium:click","params":{"selector":"a","waitBehavior":"none"}}"#,
        )
        .await;

    let response = client.recv_response(8).await;
    assert_eq!(response["type"], "success");
    assert!(start.elapsed() < Duration::from_secs(2));

    router.on_client_disconnect(1).await;
}

#[tokio::test]
async fn type_sends_focus_click_then_key_pairs() {
    let mut mock = MockBrowser::spawn(MockOptions::default()).await;
    let router = Router::new(LaunchOptions::default());
    let mut client = attach_client(&router, 1, &mock.url).await;

    router
        .on_client_message(
            1,
            r#"{"id":9,"method":"vibium:type","params":{"selector":"input[name=q]","text":"ab"}}"#,
        )
        .await;

    let response = client.recv_response(9).await;
    assert_eq!(
        response,
        json!({"id": 9, "type": "success", "result": {"typed": true}})
    );

    // First performActions is the focusing pointer sequence.
    let focus = mock.recv_method("input.performActions").await;
    assert_eq!(focus["params"]["actions"][0]["type"], "pointer");
    assert_eq!(focus["params"]["actions"][0]["id"], "mouse");
    let pointer_actions = focus["params"]["actions"][0]["actions"]
        .as_array()
        .expect("pointer actions");
    assert_eq!(pointer_actions.len(), 3);
    assert_eq!(pointer_actions[0]["type"], "pointerMove");
    // Element center: (8 + 120/2, 16 + 32/2) = (68, 32).
    assert_eq!(pointer_actions[0]["x"], 68);
    assert_eq!(pointer_actions[0]["y"], 32);
    assert_eq!(pointer_actions[1]["type"], "pointerDown");
    assert_eq!(pointer_actions[2]["type"], "pointerUp");

    // Second performActions types the text, one down/up pair per scalar.
    let typing = mock.recv_method("input.performActions").await;
    assert_eq!(typing["params"]["actions"][0]["type"], "key");
    assert_eq!(typing["params"]["actions"][0]["id"], "keyboard");
    assert_eq!(
        typing["params"]["actions"][0]["actions"],
        json!([
            {"type": "keyDown", "value": "a"},
            {"type": "keyUp", "value": "a"},
            {"type": "keyDown", "value": "b"},
            {"type": "keyUp", "value": "b"},
        ])
    );

    router.on_client_disconnect(1).await;
}

#[tokio::test]
async fn explicit_context_skips_get_tree() {
    let mut mock = MockBrowser::spawn(MockOptions::default()).await;
    let router = Router::new(LaunchOptions::default());
    let mut client = attach_client(&router, 1, &mock.url).await;

    router
        .on_client_message(
            1,
            r#"{"id":6,"method":"vibium:find","params":{"selector":"button","context":"ctx-9"}}"#,
        )
        .await;

    let response = client.recv_response(6).await;
    assert_eq!(response["type"], "success");

    // The target context must be the caller's, and getTree never issued.
    let mut saw_get_tree = false;
    let mut poll_context = None;
    while let Ok(text) = mock.received.try_recv() {
        let frame: Value = serde_json::from_str(&text).expect("json");
        match frame["method"].as_str() {
            Some("browsingContext.getTree") => saw_get_tree = true,
            Some("script.callFunction") => {
                poll_context = Some(frame["params"]["target"]["context"].clone());
            }
            _ => {}
        }
    }
    assert!(!saw_get_tree, "getTree issued despite explicit context");
    assert_eq!(poll_context, Some(json!("ctx-9")));

    router.on_client_disconnect(1).await;
}

#[tokio::test]
async fn malformed_params_yield_invalid_argument() {
    let mock = MockBrowser::spawn(MockOptions::default()).await;
    let router = Router::new(LaunchOptions::default());
    let mut client = attach_client(&router, 1, &mock.url).await;

    // selector is required
    router
        .on_client_message(1, r#"{"id":11,"method":"vibium:find","params":{"timeout":100}}"#)
        .await;

    let response = client.recv_response(11).await;
    assert_eq!(response["type"], "error");
    assert_eq!(response["error"]["error"], "invalid argument");

    drop(mock);
    router.on_client_disconnect(1).await;
}

#[tokio::test]
async fn interleaved_finds_each_get_one_response() {
    let mock = MockBrowser::spawn(MockOptions {
        element: None,
        ..MockOptions::default()
    })
    .await;
    let router = Router::new(LaunchOptions::default());
    let mut client = attach_client(&router, 1, &mock.url).await;

    for id in [21, 22, 23] {
        router
            .on_client_message(
                1,
                &format!(
                    r##"{{"id":{id},"method":"vibium:find","params":{{"selector":"#x","timeout":300}}}}"##
                ),
            )
            .await;
    }

    let mut seen = Vec::new();
    for _ in 0..3 {
        let text = client.next_text().await.expect("response");
        let response: Value = serde_json::from_str(&text).expect("json");
        assert_eq!(response["type"], "error");
        assert_eq!(response["error"]["error"], "timeout");
        seen.push(response["id"].as_u64().expect("id"));
    }
    seen.sort_unstable();
    assert_eq!(seen, vec![21, 22, 23]);

    router.on_client_disconnect(1).await;
}
