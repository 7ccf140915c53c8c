//! WebSocket connection to one browser's BiDi endpoint.
//!
//! The connection is a dumb framed transport: no correlation, no shape
//! knowledge. The session's correlator is the single reader; any task may
//! write, and writes are serialized internally.
//!
//! # Contract
//!
//! - [`Connection::send`] is safe to call from any task; concurrent sends
//!   are serialized on the sink.
//! - [`Connection::receive`] blocks until one text frame arrives or the
//!   transport is gone. Only the correlator calls it.
//! - [`Connection::close`] is idempotent; after it, `receive` returns
//!   [`Error::ConnectionClosed`].

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// Connection
// ============================================================================

/// A framed full-duplex transport to one browser.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync`. The write half is guarded by an async
/// mutex so frames from distinct callers never interleave; the read half
/// has a dedicated lock held only by the correlator.
pub struct Connection {
    /// Serialized write half.
    write: Mutex<SplitSink<WsStream, Message>>,
    /// Read half; single reader by convention.
    read: Mutex<SplitStream<WsStream>>,
    /// Set once by [`Connection::close`].
    closed: AtomicBool,
}

impl Connection {
    /// Connects to a browser's BiDi WebSocket endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WebSocket`] if the handshake fails.
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(url).await?;
        debug!(url, "BiDi connection established");

        let (write, read) = ws_stream.split();
        Ok(Self {
            write: Mutex::new(write),
            read: Mutex::new(read),
            closed: AtomicBool::new(false),
        })
    }

    /// Sends one text frame.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] after [`Connection::close`]
    /// - [`Error::WebSocket`] on transport failure
    pub async fn send(&self, text: &str) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }

        let mut write = self.write.lock().await;
        write.send(Message::Text(text.into())).await?;
        trace!(len = text.len(), "frame sent to browser");
        Ok(())
    }

    /// Receives the next text frame, skipping pings, pongs, and binary.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] when the peer closed or after
    ///   [`Connection::close`]
    /// - [`Error::WebSocket`] on transport failure
    pub async fn receive(&self) -> Result<String> {
        let mut read = self.read.lock().await;

        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(Error::ConnectionClosed);
            }

            match read.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.to_string()),
                Some(Ok(Message::Close(_))) | None => {
                    debug!("browser closed the BiDi connection");
                    return Err(Error::ConnectionClosed);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    if self.closed.load(Ordering::SeqCst) {
                        return Err(Error::ConnectionClosed);
                    }
                    return Err(e.into());
                }
            }
        }
    }

    /// Returns `true` once [`Connection::close`] has run.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Closes the connection.
    ///
    /// Idempotent. Initiates the WebSocket close handshake; a blocked
    /// [`Connection::receive`] returns once the peer acknowledges or the
    /// socket drops.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut write = self.write.lock().await;
        if let Err(e) = write.close().await {
            trace!(error = %e, "error closing BiDi connection");
        }
        debug!("BiDi connection closed");
    }
}

// ============================================================================
// Tests
// ============================================================================
