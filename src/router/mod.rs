//! Session routing between automation clients and their browsers.
//!
//! The [`Router`] owns the client-id → [`Session`] map and the lifecycle
//! hooks the front-end drives. Each client gets a dedicated browser; traffic
//! flows through the session's correlator, and the three `vibium:` extension
//! methods are intercepted here and handed to the engine. Everything else is
//! relayed verbatim in both directions.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `session` | Per-client session, correlator, teardown |
//! | `engine` | `vibium:find` / `vibium:click` / `vibium:type` |
//! | `listeners` | Bounded event listener queues |

// ============================================================================
// Submodules
// ============================================================================

/// Extension command engine.
mod engine;

/// Event listener registry.
pub mod listeners;

/// Per-client browser session.
pub mod session;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::launcher::{self, LaunchHandle, LaunchOptions};
use crate::protocol::extension::{METHOD_CLICK, METHOD_FIND, METHOD_TYPE};
use crate::protocol::{ClientCommand, CommandResponse};
use crate::server::ClientHandle;
use crate::transport::Connection;

// ============================================================================
// Re-exports
// ============================================================================

pub use listeners::{EventListener, ListenerRegistry};
pub use session::Session;

// ============================================================================
// Router
// ============================================================================

/// Maps connected clients to their browser sessions.
pub struct Router {
    /// Active sessions by client id.
    sessions: RwLock<FxHashMap<u64, Arc<Session>>>,
    /// How browsers are launched for new clients.
    launch_options: LaunchOptions,
}

impl Router {
    /// Creates a router that launches browsers with `launch_options`.
    #[must_use]
    pub fn new(launch_options: LaunchOptions) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(FxHashMap::default()),
            launch_options,
        })
    }

    /// Number of active sessions.
    #[inline]
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }
}

// ============================================================================
// Router - Client Lifecycle
// ============================================================================

impl Router {
    /// Handles a new client: launch a browser, attach, start the session.
    ///
    /// On failure the client receives one error frame and is closed; no
    /// session is registered.
    pub async fn on_client_connect(self: Arc<Self>, client: ClientHandle) {
        let client_id = client.id();
        info!(client_id, "launching browser");

        let launch = match launcher::launch(&self.launch_options).await {
            Ok(launch) => launch,
            Err(e) => {
                warn!(client_id, error = %e, "browser launch failed");
                reject(&client, &e);
                return;
            }
        };
        info!(client_id, url = launch.ws_url(), "browser ready");

        if let Err(e) = self.attach(client.clone(), launch).await {
            warn!(client_id, error = %e, "session attach failed");
            reject(&client, &e);
        }
    }

    /// Attaches a client to a browser that is already running.
    ///
    /// Connects the BiDi transport, registers the session, starts its
    /// correlator, and subscribes to navigation events. Public so operators
    /// (and tests) can route clients to externally launched browsers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Attach`] if the BiDi WebSocket cannot be opened;
    /// the launch handle is closed before returning.
    pub async fn attach(self: Arc<Self>, client: ClientHandle, launch: LaunchHandle) -> Result<()> {
        let client_id = client.id();

        let conn = match Connection::connect(launch.ws_url()).await {
            Ok(conn) => conn,
            Err(e) => {
                launch.close();
                return Err(Error::attach(e.to_string()));
            }
        };

        let session = Session::new(client, conn, launch);
        self.sessions.write().insert(client_id, Arc::clone(&session));

        tokio::spawn(Arc::clone(&session).run_correlator(self));
        session.subscribe_navigation().await;

        info!(client_id, "session started");
        Ok(())
    }

    /// Handles one client frame: intercept `vibium:` methods, forward the
    /// rest verbatim.
    pub async fn on_client_message(&self, client_id: u64, text: &str) {
        let session = self.sessions.read().get(&client_id).cloned();
        let Some(session) = session else {
            debug!(client_id, "message from client without session, dropped");
            return;
        };
        if session.is_closed() {
            return;
        }

        // Best-effort parse; anything that is not a well-formed command is
        // the browser's problem, not ours.
        let command: ClientCommand = match serde_json::from_str(text) {
            Ok(command) => command,
            Err(_) => {
                if let Err(e) = session.forward_to_browser(text).await {
                    warn!(client_id, error = %e, "failed to forward frame to browser");
                }
                return;
            }
        };
        session.observe_client_id(command.id);

        match command.method.as_str() {
            METHOD_FIND => {
                tokio::spawn(engine::handle_find(session, command.id, command.params));
            }
            METHOD_CLICK => {
                tokio::spawn(engine::handle_click(session, command.id, command.params));
            }
            METHOD_TYPE => {
                tokio::spawn(engine::handle_type(session, command.id, command.params));
            }
            _ => {
                if let Err(e) = session.forward_to_browser(text).await {
                    warn!(client_id, error = %e, "failed to forward frame to browser");
                }
            }
        }
    }

    /// Handles a client disconnect: remove and tear down atomically.
    pub async fn on_client_disconnect(&self, client_id: u64) {
        let removed = self.sessions.write().remove(&client_id);
        if let Some(session) = removed {
            info!(client_id, "client disconnected");
            session.teardown().await;
        }
    }

    /// Handles a browser disconnect observed by the correlator.
    ///
    /// Same removal as a client disconnect; teardown closes the client
    /// connection as part of its sequence.
    pub(crate) async fn on_browser_disconnect(&self, client_id: u64) {
        let removed = self.sessions.write().remove(&client_id);
        if let Some(session) = removed {
            warn!(client_id, "browser disconnected, closing session");
            session.teardown().await;
        }
    }

    /// Tears down every session. Used at daemon shutdown.
    pub async fn close_all(&self) {
        let sessions: Vec<(u64, Arc<Session>)> = {
            let mut map = self.sessions.write();
            map.drain().collect()
        };

        info!(count = sessions.len(), "closing all sessions");
        for (_, session) in sessions {
            session.teardown().await;
        }
    }
}

/// Sends one error frame to a client that never got a session, then closes.
fn reject(client: &ClientHandle, err: &Error) {
    client.send(CommandResponse::error(0, err).encode());
    client.close();
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::server::OutboundFrame;

    #[tokio::test]
    async fn test_message_without_session_is_dropped() {
        let router = Router::new(LaunchOptions::default());
        // Must not panic or register anything.
        router.on_client_message(99, r#"{"id":1,"method":"session.status"}"#).await;
        assert_eq!(router.session_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_without_session_is_noop() {
        let router = Router::new(LaunchOptions::default());
        router.on_client_disconnect(42).await;
        assert_eq!(router.session_count(), 0);
    }

    #[tokio::test]
    async fn test_attach_failure_closes_launch_and_reports() {
        let router = Router::new(LaunchOptions::default());
        let (client, mut client_rx) = ClientHandle::new(1);

        // Nothing listens on this port; attach must fail cleanly.
        let launch = LaunchHandle::attach("ws://127.0.0.1:1/session");
        let result = Arc::clone(&router).attach(client.clone(), launch).await;
        assert!(matches!(result, Err(Error::Attach { .. })));
        assert_eq!(router.session_count(), 0);

        reject(&client, &result.unwrap_err());
        let Ok(OutboundFrame::Text(frame)) = client_rx.try_recv() else {
            panic!("expected error frame");
        };
        assert!(frame.contains("attach failed"));
        assert!(matches!(client_rx.try_recv(), Ok(OutboundFrame::Close)));
    }
}
