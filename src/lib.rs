//! vibium - a WebDriver BiDi browser-automation proxy.
//!
//! The proxy sits between automation clients and real browsers. Each client
//! that connects gets a dedicated browser instance; standard BiDi traffic is
//! relayed transparently in both directions, and three `vibium:` extension
//! methods compose BiDi primitives into reliable high-level actions.
//!
//! # Architecture
//!
//! ```text
//! client ──ws──► Server ──► Router ──┬─► vibium:* ──► extension engine ─┐
//!                                    └─► everything else ──────────────┤
//!                                                                      ▼
//!                          Session (correlator, id space, listeners) ──ws──► browser
//! ```
//!
//! Key design principles:
//!
//! - Each [`Session`] owns: browser process + BiDi connection + correlator
//! - The correlator is the single reader of the browser connection
//! - Router-owned command ids live in a disjoint high range (≥ 1,000,000)
//! - Extension commands share one deadline across all of their stages
//!
//! # Extension methods
//!
//! | Method | Effect |
//! |--------|--------|
//! | `vibium:find` | Poll for a selector, return tag/text/box |
//! | `vibium:click` | Click the element center, await navigation per policy |
//! | `vibium:type` | Focus-click, then per-scalar key events |
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use vibium::{LaunchOptions, Result, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let router = Router::new(LaunchOptions {
//!         headless: true,
//!         ..LaunchOptions::default()
//!     });
//!
//!     let server = Server::bind("127.0.0.1:9223".parse().unwrap(), Arc::clone(&router)).await?;
//!     server.run().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`launcher`] | Browser process lifecycle |
//! | [`protocol`] | BiDi frame classification and typed commands |
//! | [`router`] | Session map, correlator, extension engine |
//! | [`server`] | Client-accepting WebSocket front-end |
//! | [`transport`] | WebSocket transport to the browser |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Browser process lifecycle.
///
/// Launches a dedicated browser per session and finds its BiDi endpoint.
pub mod launcher;

/// BiDi wire protocol types.
///
/// Frame classification, typed southbound commands, and the `vibium:`
/// extension surface.
pub mod protocol;

/// Session routing.
///
/// The [`Router`], per-client [`Session`]s, and the extension engine.
pub mod router;

/// Client-accepting WebSocket front-end.
pub mod server;

/// WebSocket transport to the browser.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result};

// Launcher types
pub use launcher::{launch, LaunchHandle, LaunchOptions};

// Protocol types
pub use protocol::{
    BoundingBox, ClientCommand, CommandResponse, ElementInfo, Frame, WaitBehavior,
};

// Router types
pub use router::{Router, Session};

// Server types
pub use server::{ClientHandle, Server};

// Transport types
pub use transport::Connection;
