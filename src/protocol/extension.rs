//! Northbound `vibium:` extension command surface.
//!
//! Defines the parameter structs for the three extension methods, the
//! element info returned by `vibium:find`, and the response envelope sent
//! back to automation clients.
//!
//! # Wire format
//!
//! | Method | Params | Result |
//! |--------|--------|--------|
//! | `vibium:find` | [`FindParams`] | [`ElementInfo`] |
//! | `vibium:click` | [`ClickParams`] | `{"clicked": true}` |
//! | `vibium:type` | [`TypeParams`] | `{"typed": true}` |
//!
//! Responses use the envelope
//! `{id, type: "success"|"error", result?, error?: {error, message}}`.
//! This shape is deliberate for extension responses and is not made to look
//! like a native browser error frame.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

// ============================================================================
// Constants
// ============================================================================

/// Method name for the find extension command.
pub const METHOD_FIND: &str = "vibium:find";

/// Method name for the click extension command.
pub const METHOD_CLICK: &str = "vibium:click";

/// Method name for the type extension command.
pub const METHOD_TYPE: &str = "vibium:type";

/// Default command timeout when the `timeout` param is absent or zero.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

// ============================================================================
// ClientCommand
// ============================================================================

/// A best-effort parse of a client frame.
///
/// Used only for routing: extension methods are intercepted, everything
/// else is forwarded as the original bytes. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientCommand {
    /// Client-chosen command id, echoed in the response.
    pub id: u64,
    /// Command method.
    #[serde(default)]
    pub method: String,
    /// Raw params, deserialized per-method by the engine.
    #[serde(default)]
    pub params: Value,
}

// ============================================================================
// WaitBehavior
// ============================================================================

/// Navigation milestones an extension command blocks on after its action.
///
/// `vibium:click` defaults to [`WaitBehavior::WaitForLoad`]; `vibium:type`
/// defaults to [`WaitBehavior::None`]. The asymmetry is intentional: typing
/// rarely triggers navigation, clicking frequently does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WaitBehavior {
    /// Do not register listeners, do not wait.
    None,
    /// Wait for `browsingContext.navigationStarted`.
    WaitForNavigationStarted,
    /// As above, then wait for `browsingContext.domContentLoaded`.
    WaitForDomContentLoaded,
    /// As above, then wait for `browsingContext.load`.
    WaitForLoad,
}

fn default_click_wait() -> WaitBehavior {
    WaitBehavior::WaitForLoad
}

fn default_type_wait() -> WaitBehavior {
    WaitBehavior::None
}

// ============================================================================
// Command Params
// ============================================================================

/// Parameters for `vibium:find`.
#[derive(Debug, Clone, Deserialize)]
pub struct FindParams {
    /// CSS selector to poll for.
    pub selector: String,
    /// Browsing context id; first top-level context when absent.
    #[serde(default)]
    pub context: Option<String>,
    /// Command timeout in milliseconds; 0 or absent means the default.
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// Parameters for `vibium:click`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClickParams {
    /// CSS selector to poll for.
    pub selector: String,
    /// Browsing context id; first top-level context when absent.
    #[serde(default)]
    pub context: Option<String>,
    /// Command timeout in milliseconds; 0 or absent means the default.
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Navigation wait policy after the click.
    #[serde(default = "default_click_wait", rename = "waitBehavior")]
    pub wait_behavior: WaitBehavior,
}

/// Parameters for `vibium:type`.
#[derive(Debug, Clone, Deserialize)]
pub struct TypeParams {
    /// CSS selector to poll for.
    pub selector: String,
    /// Text to type, one keyDown/keyUp pair per Unicode scalar.
    pub text: String,
    /// Browsing context id; first top-level context when absent.
    #[serde(default)]
    pub context: Option<String>,
    /// Command timeout in milliseconds; 0 or absent means the default.
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Navigation wait policy after the keystrokes.
    #[serde(default = "default_type_wait", rename = "waitBehavior")]
    pub wait_behavior: WaitBehavior,
}

/// Resolves the effective timeout from a raw `timeout` param.
///
/// Zero is treated as unset, matching the tolerant reading of loosely typed
/// clients that send `timeout: 0` for "default".
#[inline]
#[must_use]
pub fn effective_timeout_ms(timeout: Option<u64>) -> u64 {
    match timeout {
        Some(ms) if ms > 0 => ms,
        _ => DEFAULT_TIMEOUT_MS,
    }
}

// ============================================================================
// ElementInfo
// ============================================================================

/// Element description returned by the polling script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementInfo {
    /// Lowercased tag name.
    pub tag: String,
    /// Trimmed `textContent`, truncated to 100 characters.
    pub text: String,
    /// Bounding client rect.
    #[serde(rename = "box")]
    pub bounds: BoundingBox,
}

/// A bounding client rect in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Rect width.
    pub width: f64,
    /// Rect height.
    pub height: f64,
}

impl BoundingBox {
    /// Center point of the rect, rounded down to integer pixels.
    #[inline]
    #[must_use]
    pub fn center(&self) -> (i64, i64) {
        (
            (self.x + self.width / 2.0).floor() as i64,
            (self.y + self.height / 2.0).floor() as i64,
        )
    }
}

// ============================================================================
// Response Envelope
// ============================================================================

/// Response type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Successful response.
    Success,
    /// Error response.
    Error,
}

/// Error body of an extension error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Short error code (e.g. "timeout").
    pub error: String,
    /// Human-readable message.
    pub message: String,
}

/// Response envelope for extension commands.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResponse {
    /// Echoes the client command id.
    pub id: u64,
    /// Success or error.
    #[serde(rename = "type")]
    pub response_type: ResponseType,
    /// Result payload (success only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error descriptor (error only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl CommandResponse {
    /// Builds a success envelope.
    #[must_use]
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            id,
            response_type: ResponseType::Success,
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error envelope from a crate error.
    #[must_use]
    pub fn error(id: u64, err: &Error) -> Self {
        Self {
            id,
            response_type: ResponseType::Error,
            result: None,
            error: Some(ErrorBody {
                error: err.wire_code().to_string(),
                message: err.to_string(),
            }),
        }
    }

    /// Serializes the envelope to its wire form.
    ///
    /// Serialization of this shape cannot fail; a defect here would be a
    /// programming error, so the panic is acceptable.
    #[must_use]
    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("response envelope serializes")
    }
}

// ============================================================================
// Tests
// ============================================================================
