//! Per-client browser session.
//!
//! A [`Session`] owns everything tied to one automation client: the browser
//! launch handle, the BiDi connection, the correlator task, the pending map
//! for router-originated commands, and the event listener registry.
//!
//! # Correlator
//!
//! The correlator is the only reader of the BiDi connection. Each inbound
//! frame goes to exactly one of three places:
//!
//! - a response whose id is in the pending map → the internal caller, and
//!   never the client;
//! - an event → every registered listener queue **and** the client;
//! - anything else → the client, byte-identical.
//!
//! # Id space
//!
//! Router-originated command ids start at 1,000,000 and increment per
//! session. The counter is additionally advanced past every id observed on
//! forwarded client commands, so the sequence never collides with an id the
//! client has used.
//!
//! # Teardown
//!
//! Exactly-once, in order: cancel the stop token, best-effort navigation
//! unsubscribe, close the BiDi connection (unblocks the correlator), kill
//! the browser, fail pending internal commands, close the client.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::launcher::LaunchHandle;
use crate::protocol::{
    CommandFrame, CommandResponse, Frame, SubscribeParams, SubscribeResult, UnsubscribeParams,
};
use crate::router::listeners::ListenerRegistry;
use crate::router::Router;
use crate::server::ClientHandle;
use crate::transport::Connection;

// ============================================================================
// Constants
// ============================================================================

/// First router-owned command id; client ids live below this watermark.
const INTERNAL_ID_BASE: u64 = 1_000_000;

/// Hard cap on any single internal command; deadlock guard, independent of
/// the per-command deadlines callers enforce.
const INTERNAL_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Navigation milestone event fired when a navigation begins.
pub const EVENT_NAVIGATION_STARTED: &str = "browsingContext.navigationStarted";

/// Navigation milestone event fired at DOMContentLoaded.
pub const EVENT_DOM_CONTENT_LOADED: &str = "browsingContext.domContentLoaded";

/// Navigation milestone event fired at window load.
pub const EVENT_LOAD: &str = "browsingContext.load";

/// The navigation events every session subscribes to at startup.
pub const NAVIGATION_EVENTS: [&str; 3] = [
    EVENT_NAVIGATION_STARTED,
    EVENT_DOM_CONTENT_LOADED,
    EVENT_LOAD,
];

// ============================================================================
// Session
// ============================================================================

/// One client's browser session.
pub struct Session {
    /// Sender half of the client connection.
    client: ClientHandle,
    /// BiDi transport to the dedicated browser.
    conn: Connection,
    /// Browser process handle for teardown.
    launch: LaunchHandle,
    /// Wakes every inner wait when the session closes.
    stop: CancellationToken,
    /// Set once by [`Session::teardown`].
    closed: AtomicBool,
    /// Next router-owned command id.
    next_internal_id: AtomicU64,
    /// Reply slots for in-flight internal commands.
    pending: Mutex<FxHashMap<u64, oneshot::Sender<Value>>>,
    /// Event listener queues for extension commands.
    listeners: ListenerRegistry,
    /// Navigation subscription handle, released at teardown.
    nav_subscription: Mutex<Option<String>>,
}

impl Session {
    /// Creates a session over an attached browser.
    pub(crate) fn new(client: ClientHandle, conn: Connection, launch: LaunchHandle) -> Arc<Self> {
        Arc::new(Self {
            client,
            conn,
            launch,
            stop: CancellationToken::new(),
            closed: AtomicBool::new(false),
            next_internal_id: AtomicU64::new(INTERNAL_ID_BASE),
            pending: Mutex::new(FxHashMap::default()),
            listeners: ListenerRegistry::new(),
            nav_subscription: Mutex::new(None),
        })
    }

    /// Id of the owning client.
    #[inline]
    #[must_use]
    pub fn client_id(&self) -> u64 {
        self.client.id()
    }

    /// Returns `true` once teardown has begun.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Token cancelled at teardown; inner waits race against it.
    #[inline]
    pub(crate) fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }

    /// The session's event listener registry.
    #[inline]
    pub(crate) fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Advances the internal id counter past a client-used id.
    ///
    /// Called for every id observed on a client command, keeping the
    /// router-owned sequence collision-free even for clients that wander
    /// into the high range.
    pub(crate) fn observe_client_id(&self, id: u64) {
        self.next_internal_id
            .fetch_max(id.saturating_add(1), Ordering::SeqCst);
    }
}

// ============================================================================
// Session - Internal Command Issuer
// ============================================================================

impl Session {
    /// Sends a router-originated BiDi command and waits for its response.
    ///
    /// Returns the raw response frame; callers decide whether an error
    /// payload is fatal. The pending entry is removed on every exit.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionClosed`] if the session stops while waiting
    /// - [`Error::InternalTimeout`] after the 60 s hard cap
    /// - transport errors from the underlying send
    pub async fn send_internal(&self, method: &str, params: Value) -> Result<Value> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }

        let id = self.next_internal_id.fetch_add(1, Ordering::SeqCst);
        let text = CommandFrame { id, method, params }.encode()?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let result = async {
            self.conn.send(&text).await?;
            trace!(id, method, "internal command sent");

            tokio::select! {
                reply = rx => reply.map_err(|_| Error::SessionClosed),
                () = tokio::time::sleep(INTERNAL_COMMAND_TIMEOUT) => {
                    Err(Error::internal_timeout(method))
                }
                () = self.stop.cancelled() => Err(Error::SessionClosed),
            }
        }
        .await;

        // Normally removed by the correlator on delivery; this covers the
        // timeout, abort, and send-failure exits.
        self.pending.lock().remove(&id);
        result
    }

    /// Forwards a client frame to the browser unmodified.
    pub(crate) async fn forward_to_browser(&self, text: &str) -> Result<()> {
        self.conn.send(text).await
    }
}

// ============================================================================
// Session - Client Responses
// ============================================================================

impl Session {
    /// Sends a success envelope to the client.
    pub(crate) fn respond_success(&self, id: u64, result: Value) {
        self.respond(&CommandResponse::success(id, result));
    }

    /// Sends an error envelope to the client.
    pub(crate) fn respond_error(&self, id: u64, err: &Error) {
        debug!(client_id = self.client_id(), id, error = %err, "extension command failed");
        self.respond(&CommandResponse::error(id, err));
    }

    fn respond(&self, response: &CommandResponse) {
        if !self.client.send(response.encode()) {
            debug!(client_id = self.client_id(), "client gone, response dropped");
        }
    }

    fn forward_to_client(&self, text: &str) {
        if !self.client.send(text) {
            debug!(client_id = self.client_id(), "client gone, frame dropped");
        }
    }
}

// ============================================================================
// Session - Navigation Subscription
// ============================================================================

impl Session {
    /// Subscribes to the navigation milestone events.
    ///
    /// Failure is logged and tolerated: the session stays usable, but wait
    /// stages that depend on events will run into their deadlines.
    pub(crate) async fn subscribe_navigation(&self) {
        let params = SubscribeParams {
            events: NAVIGATION_EVENTS.iter().map(ToString::to_string).collect(),
        };
        let params = match serde_json::to_value(&params) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "failed to encode subscribe params");
                return;
            }
        };

        match self.send_internal("session.subscribe", params).await {
            Ok(frame) => match Frame::from_value(frame).into_result() {
                Ok(result) => match serde_json::from_value::<SubscribeResult>(result) {
                    Ok(subscribed) => {
                        debug!(
                            client_id = self.client_id(),
                            subscription = %subscribed.subscription,
                            "subscribed to navigation events"
                        );
                        *self.nav_subscription.lock() = Some(subscribed.subscription);
                    }
                    Err(e) => warn!(error = %e, "malformed session.subscribe result"),
                },
                Err(e) => warn!(error = %e, "session.subscribe rejected"),
            },
            Err(e) => warn!(
                client_id = self.client_id(),
                error = %e,
                "navigation subscription failed; navigation waits will time out"
            ),
        }
    }
}

// ============================================================================
// Session - Correlator
// ============================================================================

impl Session {
    /// Reads the BiDi connection until it fails, fanning each frame out.
    ///
    /// On a read error that was not caused by our own close, the browser is
    /// gone: the session is removed from the router and torn down, which
    /// also closes the client.
    pub(crate) async fn run_correlator(self: Arc<Self>, router: Arc<Router>) {
        let client_id = self.client_id();
        debug!(client_id, "correlator started");

        loop {
            match self.conn.receive().await {
                Ok(text) => self.dispatch_frame(&text),
                Err(e) => {
                    if !self.is_closed() {
                        warn!(client_id, error = %e, "browser connection lost");
                        router.on_browser_disconnect(client_id).await;
                    }
                    break;
                }
            }
        }

        debug!(client_id, "correlator terminated");
    }

    /// Routes one browser frame to its sinks.
    fn dispatch_frame(&self, text: &str) {
        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(
                    client_id = self.client_id(),
                    error = %e,
                    "unparseable frame from browser, forwarding verbatim"
                );
                self.forward_to_client(text);
                return;
            }
        };

        if let Some(id) = frame.id() {
            let slot = self.pending.lock().remove(&id);
            if let Some(slot) = slot {
                // Internal reply; the client never sees it.
                let _ = slot.send(frame.into_value());
                return;
            }
            self.forward_to_client(text);
            return;
        }

        if let Some(method) = frame.method() {
            // Listeners observe; the client still gets its copy.
            self.listeners.dispatch(method, frame.value());
            self.forward_to_client(text);
            return;
        }

        self.forward_to_client(text);
    }
}

// ============================================================================
// Session - Teardown
// ============================================================================

impl Session {
    /// Tears the session down. Idempotent; only the first caller acts.
    pub(crate) async fn teardown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let client_id = self.client_id();
        info!(client_id, "closing session");

        // Wake every inner wait before touching the transport.
        self.stop.cancel();

        self.unsubscribe_navigation().await;

        // Unblocks the correlator.
        self.conn.close().await;

        self.launch.close();
        self.fail_pending();
        self.client.close();

        info!(client_id, "session closed");
    }

    /// Best-effort unsubscribe: the command is written without waiting for
    /// a reply, and every failure is swallowed.
    async fn unsubscribe_navigation(&self) {
        let subscription = self.nav_subscription.lock().take();
        let Some(subscription) = subscription else {
            return;
        };

        let params = UnsubscribeParams {
            subscriptions: vec![subscription],
        };
        let Ok(params) = serde_json::to_value(&params) else {
            return;
        };

        let id = self.next_internal_id.fetch_add(1, Ordering::SeqCst);
        let frame = CommandFrame {
            id,
            method: "session.unsubscribe",
            params,
        };
        match frame.encode() {
            Ok(text) => {
                if let Err(e) = self.conn.send(&text).await {
                    trace!(error = %e, "navigation unsubscribe not delivered");
                }
            }
            Err(e) => trace!(error = %e, "navigation unsubscribe not encoded"),
        }
    }

    /// Drops every pending reply slot, waking the waiters with a
    /// session-closed error.
    fn fail_pending(&self) {
        let drained: Vec<_> = {
            let mut pending = self.pending.lock();
            pending.drain().collect()
        };
        if !drained.is_empty() {
            debug!(count = drained.len(), "failed pending internal commands");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
