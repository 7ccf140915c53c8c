//! WebSocket front-end for automation clients.
//!
//! Accepts client connections, assigns each a monotonically increasing id,
//! and drives the router's lifecycle hooks:
//!
//! 1. TCP accept, WebSocket upgrade
//! 2. `on_client_connect` (launches a dedicated browser)
//! 3. `on_client_message` per text frame
//! 4. `on_client_disconnect` on EOF or error
//!
//! The server holds no session state; the router map is the single
//! registry. Outbound traffic to a client goes through [`ClientHandle`], a
//! cheap-to-clone sender drained by a per-client writer task, so the
//! correlator and extension commands never block on a slow client.

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::router::Router;

// ============================================================================
// OutboundFrame
// ============================================================================

/// A frame queued for delivery to a client.
#[derive(Debug)]
pub enum OutboundFrame {
    /// Text frame to send.
    Text(String),
    /// Close the client connection.
    Close,
}

// ============================================================================
// ClientHandle
// ============================================================================

/// Sender half of one client connection.
///
/// Clones share the same outbound queue and closed flag. Sends are
/// non-blocking; once the connection is closed or gone they fail and the
/// frame is dropped by the caller.
#[derive(Clone)]
pub struct ClientHandle {
    id: u64,
    tx: mpsc::UnboundedSender<OutboundFrame>,
    closed: Arc<AtomicBool>,
}

impl ClientHandle {
    /// Creates a handle and the receiving end of its outbound queue.
    ///
    /// The server pairs the receiver with a writer task; tests keep it to
    /// observe what the router sends.
    #[must_use]
    pub fn new(id: u64) -> (Self, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id,
                tx,
                closed: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    /// The client id, key into the router's session map.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns `true` once [`ClientHandle::close`] has run.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Queues a text frame; returns `false` if the client is closed or gone.
    pub fn send(&self, text: impl Into<String>) -> bool {
        if self.is_closed() {
            return false;
        }
        self.tx.send(OutboundFrame::Text(text.into())).is_ok()
    }

    /// Closes the connection. Idempotent; subsequent sends fail.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.tx.send(OutboundFrame::Close);
    }
}

// ============================================================================
// Server
// ============================================================================

/// The client-accepting WebSocket server.
pub struct Server {
    listener: TcpListener,
    router: Arc<Router>,
    next_client_id: AtomicU64,
}

impl Server {
    /// Binds the server to `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if binding fails.
    pub async fn bind(addr: SocketAddr, router: Arc<Router>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "listening for automation clients");

        Ok(Self {
            listener,
            router,
            next_client_id: AtomicU64::new(1),
        })
    }

    /// The bound local address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if the socket is gone.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts clients until the listener fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) on accept failure.
    pub async fn run(self) -> Result<()> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            let client_id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
            let router = Arc::clone(&self.router);

            debug!(client_id, %addr, "client connected");
            tokio::spawn(async move {
                handle_client(stream, client_id, router).await;
            });
        }
    }
}

// ============================================================================
// Per-client task
// ============================================================================

/// Runs one client connection to completion.
async fn handle_client(stream: TcpStream, client_id: u64, router: Arc<Router>) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(client_id, error = %e, "WebSocket upgrade failed");
            return;
        }
    };

    let (mut ws_write, mut ws_read) = ws_stream.split();
    let (handle, mut outbound) = ClientHandle::new(client_id);

    // Writer task: the sole owner of the sink.
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            match frame {
                OutboundFrame::Text(text) => {
                    if ws_write.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                OutboundFrame::Close => break,
            }
        }
        let _ = ws_write.close().await;
    });

    // Launches the browser and registers the session; on failure the router
    // has already sent an error frame and requested the close.
    Arc::clone(&router).on_client_connect(handle.clone()).await;

    while let Some(message) = ws_read.next().await {
        match message {
            Ok(Message::Text(text)) => {
                router.on_client_message(client_id, text.as_str()).await;
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    debug!(client_id, "client read loop ended");
    router.on_client_disconnect(client_id).await;
    handle.close();
    let _ = writer.await;
}

// ============================================================================
// Tests
// ============================================================================
