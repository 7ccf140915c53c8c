//! Typed parameters for the BiDi commands the proxy composes.
//!
//! The extension engine never assembles ad-hoc JSON maps; every southbound
//! command it issues is built from one of these structs and serialized with
//! serde. Result shapes are deserialized from the `result` payload of the
//! matching response frame.
//!
//! # Commands
//!
//! | Method | Params | Result |
//! |--------|--------|--------|
//! | `session.subscribe` | [`SubscribeParams`] | [`SubscribeResult`] |
//! | `session.unsubscribe` | [`UnsubscribeParams`] | — |
//! | `browsingContext.getTree` | `{}` | [`GetTreeResult`] |
//! | `script.callFunction` | [`CallFunctionParams`] | [`CallFunctionResult`] |
//! | `input.performActions` | [`PerformActionsParams`] | — |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

// ============================================================================
// session.subscribe / session.unsubscribe
// ============================================================================

/// Parameters for `session.subscribe`.
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeParams {
    /// Event names to subscribe to.
    pub events: Vec<String>,
}

/// Result of `session.subscribe`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeResult {
    /// Opaque subscription handle, used for unsubscribe.
    pub subscription: String,
}

/// Parameters for `session.unsubscribe` by subscription handle.
#[derive(Debug, Clone, Serialize)]
pub struct UnsubscribeParams {
    /// Subscription handles to remove.
    pub subscriptions: Vec<String>,
}

// ============================================================================
// browsingContext.getTree
// ============================================================================

/// Result of `browsingContext.getTree`.
#[derive(Debug, Clone, Deserialize)]
pub struct GetTreeResult {
    /// Top-level browsing contexts.
    pub contexts: Vec<ContextEntry>,
}

/// One entry of the browsing context tree.
///
/// Only the context id is consumed; child trees and URLs are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ContextEntry {
    /// Opaque browsing context id.
    pub context: String,
}

// ============================================================================
// script.callFunction
// ============================================================================

/// Parameters for `script.callFunction`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFunctionParams {
    /// Source of the function to evaluate in the page.
    pub function_declaration: String,
    /// Realm target, by browsing context.
    pub target: Target,
    /// Positional arguments.
    pub arguments: Vec<ScriptArgument>,
    /// Whether to await a returned promise.
    pub await_promise: bool,
    /// Handle ownership for the returned value.
    pub result_ownership: &'static str,
}

/// A browsing-context realm target.
#[derive(Debug, Clone, Serialize)]
pub struct Target {
    /// Browsing context id.
    pub context: String,
}

/// A script argument value.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScriptArgument {
    /// A string argument.
    String {
        /// The string value.
        value: String,
    },
}

/// Result of `script.callFunction`.
///
/// The interesting payload is nested one level down:
/// `{"result": {"type": "string", "value": "..."}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct CallFunctionResult {
    /// The returned remote value.
    pub result: RemoteValue,
}

/// A remote value returned by script evaluation.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteValue {
    /// Value type tag ("string", "null", ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// String payload when `kind == "string"`.
    #[serde(default)]
    pub value: Option<String>,
}

// ============================================================================
// input.performActions
// ============================================================================

/// Parameters for `input.performActions`.
#[derive(Debug, Clone, Serialize)]
pub struct PerformActionsParams {
    /// Browsing context to act in.
    pub context: String,
    /// Input sources and their action sequences.
    pub actions: Vec<ActionSource>,
}

/// One input source in an action sequence.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActionSource {
    /// A pointer source (mouse).
    Pointer {
        /// Source id, stable across commands.
        id: String,
        /// Pointer configuration.
        parameters: PointerParameters,
        /// Ordered pointer actions.
        actions: Vec<PointerAction>,
    },
    /// A key source (keyboard).
    Key {
        /// Source id, stable across commands.
        id: String,
        /// Ordered key actions.
        actions: Vec<KeyAction>,
    },
}

/// Pointer source configuration.
#[derive(Debug, Clone, Serialize)]
pub struct PointerParameters {
    /// Pointer type ("mouse").
    #[serde(rename = "pointerType")]
    pub pointer_type: &'static str,
}

/// A single pointer action.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum PointerAction {
    /// Move to viewport coordinates.
    #[serde(rename = "pointerMove")]
    Move {
        /// Target x, viewport pixels.
        x: i64,
        /// Target y, viewport pixels.
        y: i64,
        /// Move duration in milliseconds.
        duration: u64,
    },
    /// Press a button.
    #[serde(rename = "pointerDown")]
    Down {
        /// Button index (0 = primary).
        button: u32,
    },
    /// Release a button.
    #[serde(rename = "pointerUp")]
    Up {
        /// Button index (0 = primary).
        button: u32,
    },
}

/// A single key action.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum KeyAction {
    /// Press a key.
    #[serde(rename = "keyDown")]
    Down {
        /// Key value (a single Unicode scalar).
        value: String,
    },
    /// Release a key.
    #[serde(rename = "keyUp")]
    Up {
        /// Key value (a single Unicode scalar).
        value: String,
    },
}

// ============================================================================
// Builders
// ============================================================================

/// Builds a pointer click sequence at `(x, y)`: move, down, up.
///
/// Used both for `vibium:click` and for the focusing click of `vibium:type`.
#[must_use]
pub fn pointer_click(context: &str, x: i64, y: i64) -> PerformActionsParams {
    PerformActionsParams {
        context: context.to_string(),
        actions: vec![ActionSource::Pointer {
            id: "mouse".to_string(),
            parameters: PointerParameters {
                pointer_type: "mouse",
            },
            actions: vec![
                PointerAction::Move { x, y, duration: 0 },
                PointerAction::Down { button: 0 },
                PointerAction::Up { button: 0 },
            ],
        }],
    }
}

/// Builds a key sequence typing `text`: keyDown + keyUp per Unicode scalar.
#[must_use]
pub fn key_type(context: &str, text: &str) -> PerformActionsParams {
    let mut actions = Vec::with_capacity(text.chars().count() * 2);
    for ch in text.chars() {
        actions.push(KeyAction::Down {
            value: ch.to_string(),
        });
        actions.push(KeyAction::Up {
            value: ch.to_string(),
        });
    }

    PerformActionsParams {
        context: context.to_string(),
        actions: vec![ActionSource::Key {
            id: "keyboard".to_string(),
            actions,
        }],
    }
}

// ============================================================================
// Tests
// ============================================================================
