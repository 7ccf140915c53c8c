//! BiDi wire protocol types.
//!
//! This module owns every JSON shape the proxy understands:
//!
//! | Direction | Types |
//! |-----------|-------|
//! | Browser → proxy | [`Frame`] classification, [`ErrorData`] normalization |
//! | Proxy → browser | [`CommandFrame`] plus the typed params in [`command`] |
//! | Client → proxy | [`ClientCommand`], `vibium:` params in [`extension`] |
//! | Proxy → client | [`CommandResponse`] envelope |
//!
//! Frames the proxy merely relays are never re-encoded; these types are
//! used only where the proxy originates or intercepts traffic.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `message` | Neutral frame classification |
//! | `command` | Typed southbound BiDi command params |
//! | `extension` | Northbound `vibium:` surface and envelope |

// ============================================================================
// Submodules
// ============================================================================

/// Typed southbound BiDi command parameters.
pub mod command;

/// Northbound `vibium:` extension surface.
pub mod extension;

/// Neutral frame classification.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{
    ActionSource, CallFunctionParams, CallFunctionResult, ContextEntry, GetTreeResult, KeyAction,
    PerformActionsParams, PointerAction, PointerParameters, RemoteValue, ScriptArgument,
    SubscribeParams, SubscribeResult, Target, UnsubscribeParams,
};
pub use extension::{
    BoundingBox, ClickParams, ClientCommand, CommandResponse, ElementInfo, ErrorBody, FindParams,
    ResponseType, TypeParams, WaitBehavior,
};
pub use message::{CommandFrame, ErrorData, Frame};
