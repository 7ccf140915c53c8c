//! Shared fixtures for the end-to-end proxy tests.
//!
//! [`MockBrowser`] is a scripted in-process BiDi endpoint: a WebSocket
//! server that records every frame it receives, answers the commands the
//! proxy composes, and can emit arbitrary frames (events, crash) on demand.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;

use vibium::server::OutboundFrame;
use vibium::{ClientHandle, LaunchHandle, Router};

/// Element info the mock reports once a poll succeeds.
pub fn default_element() -> Value {
    json!({
        "tag": "button",
        "text": "Submit",
        "box": {"x": 8.0, "y": 16.0, "width": 120.0, "height": 32.0},
    })
}

/// Scripting knobs for [`MockBrowser`].
pub struct MockOptions {
    /// Element reported by `script.callFunction`; `None` polls null forever.
    pub element: Option<Value>,
    /// Number of null polls before the element is reported.
    pub find_succeeds_after: usize,
    /// Navigation events emitted after each `input.performActions`.
    pub nav_events_on_actions: Vec<&'static str>,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            element: Some(default_element()),
            find_succeeds_after: 0,
            nav_events_on_actions: Vec::new(),
        }
    }
}

/// A scripted BiDi browser on an ephemeral port.
pub struct MockBrowser {
    /// WebSocket URL for the proxy to attach to.
    pub url: String,
    /// Raw frames received from the proxy, in order.
    pub received: mpsc::UnboundedReceiver<String>,
    emit_tx: mpsc::UnboundedSender<String>,
    kill_tx: Option<oneshot::Sender<()>>,
}

impl MockBrowser {
    /// Binds the mock and starts serving one connection.
    pub async fn spawn(options: MockOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        let (received_tx, received) = mpsc::unbounded_channel();
        let (emit_tx, emit_rx) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = oneshot::channel();

        tokio::spawn(serve(listener, options, received_tx, emit_rx, kill_rx));

        Self {
            url: format!("ws://127.0.0.1:{port}/session"),
            received,
            emit_tx,
            kill_tx: Some(kill_tx),
        }
    }

    /// Sends a raw frame to the proxy, byte-for-byte.
    pub fn emit(&self, text: &str) {
        self.emit_tx.send(text.to_string()).expect("mock alive");
    }

    /// Drops the connection abruptly, as a crashed browser would.
    pub fn kill(&mut self) {
        if let Some(kill) = self.kill_tx.take() {
            let _ = kill.send(());
        }
    }

    /// Receives the next raw frame the proxy sent, with a timeout.
    pub async fn next_received(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(2), self.received.recv())
            .await
            .ok()
            .flatten()
    }

    /// Drains frames until one whose `method` matches, failing on timeout.
    pub async fn recv_method(&mut self, method: &str) -> Value {
        loop {
            let text = self
                .next_received()
                .await
                .unwrap_or_else(|| panic!("mock never received {method}"));
            let frame: Value = serde_json::from_str(&text).expect("frame is json");
            if frame["method"] == method {
                return frame;
            }
        }
    }
}

async fn serve(
    listener: TcpListener,
    options: MockOptions,
    received_tx: mpsc::UnboundedSender<String>,
    mut emit_rx: mpsc::UnboundedReceiver<String>,
    mut kill_rx: oneshot::Receiver<()>,
) {
    let (stream, _) = match listener.accept().await {
        Ok(accepted) => accepted,
        Err(_) => return,
    };
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(_) => return,
    };
    let (mut write, mut read) = ws.split();
    let polls = AtomicUsize::new(0);

    loop {
        tokio::select! {
            message = read.next() => {
                let Some(Ok(Message::Text(text))) = message else { return };
                let text = text.to_string();
                let _ = received_tx.send(text.clone());

                let Ok(frame) = serde_json::from_str::<Value>(&text) else { continue };
                for reply in respond(&frame, &options, &polls) {
                    let encoded = serde_json::to_string(&reply).expect("encode");
                    if write.send(Message::Text(encoded.into())).await.is_err() {
                        return;
                    }
                }
            }
            injected = emit_rx.recv() => {
                let Some(text) = injected else { continue };
                if write.send(Message::Text(text.into())).await.is_err() {
                    return;
                }
            }
            _ = &mut kill_rx => {
                // Abrupt drop, no close handshake.
                return;
            }
        }
    }
}

/// Canned replies for one command frame; events ride along after actions.
fn respond(frame: &Value, options: &MockOptions, polls: &AtomicUsize) -> Vec<Value> {
    let id = &frame["id"];
    let method = frame["method"].as_str().unwrap_or_default();

    match method {
        "session.subscribe" => vec![json!({
            "id": id, "type": "success", "result": {"subscription": "sub-1"},
        })],
        "session.unsubscribe" => vec![json!({
            "id": id, "type": "success", "result": {},
        })],
        "browsingContext.getTree" => vec![json!({
            "id": id, "type": "success",
            "result": {"contexts": [{"context": "ctx-1", "url": "about:blank", "children": []}]},
        })],
        "script.callFunction" => {
            let attempt = polls.fetch_add(1, Ordering::SeqCst);
            let found = options
                .element
                .as_ref()
                .filter(|_| attempt >= options.find_succeeds_after);
            match found {
                Some(element) => {
                    let encoded = serde_json::to_string(element).expect("encode element");
                    vec![json!({
                        "id": id, "type": "success",
                        "result": {"realm": "realm-1", "result": {"type": "string", "value": encoded}},
                    })]
                }
                None => vec![json!({
                    "id": id, "type": "success",
                    "result": {"realm": "realm-1", "result": {"type": "null"}},
                })],
            }
        }
        "input.performActions" => {
            let mut replies = vec![json!({"id": id, "type": "success", "result": {}})];
            for event in &options.nav_events_on_actions {
                replies.push(json!({"method": event, "params": {"context": "ctx-1"}}));
            }
            replies
        }
        _ => vec![json!({
            "id": id, "type": "success", "result": {"echo": method},
        })],
    }
}

/// A client wired straight into the router, observable end.
pub struct TestClient {
    pub handle: ClientHandle,
    pub rx: mpsc::UnboundedReceiver<OutboundFrame>,
}

impl TestClient {
    /// Receives the next text frame sent to the client, with a timeout.
    pub async fn next_text(&mut self) -> Option<String> {
        match tokio::time::timeout(Duration::from_secs(5), self.rx.recv()).await {
            Ok(Some(OutboundFrame::Text(text))) => Some(text),
            _ => None,
        }
    }

    /// Drains frames until the response with `id` arrives.
    ///
    /// Events forwarded to the client (dual fan-out) may precede the
    /// response; they are skipped here.
    pub async fn recv_response(&mut self, id: u64) -> Value {
        loop {
            let text = self
                .next_text()
                .await
                .unwrap_or_else(|| panic!("no response for id {id}"));
            let frame: Value = serde_json::from_str(&text).expect("frame is json");
            if frame["id"] == id {
                return frame;
            }
        }
    }

    /// Receives frames until the connection close signal arrives.
    pub async fn next_close(&mut self) -> bool {
        loop {
            match tokio::time::timeout(Duration::from_secs(2), self.rx.recv()).await {
                Ok(Some(OutboundFrame::Close)) => return true,
                Ok(Some(OutboundFrame::Text(_))) => {}
                _ => return false,
            }
        }
    }
}

/// Attaches a test client to a mock browser through the router.
pub async fn attach_client(router: &Arc<Router>, client_id: u64, mock_url: &str) -> TestClient {
    let (handle, rx) = ClientHandle::new(client_id);
    Arc::clone(router)
        .attach(handle.clone(), LaunchHandle::attach(mock_url))
        .await
        .expect("attach to mock browser");
    TestClient { handle, rx }
}
