//! Neutral BiDi frame classification.
//!
//! Every frame read from the browser is parsed into a [`Frame`] and
//! classified by shape:
//!
//! | Shape | Test |
//! |----------|------|
//! | Response | `id` present |
//! | Event | `id` absent and `method` non-empty |
//! | Error | `error` field present |
//!
//! This module is the single place frame-shape knowledge lives. It performs
//! no I/O; the correlator feeds it raw text and acts on the classification.

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

// ============================================================================
// Frame
// ============================================================================

/// A parsed BiDi frame of unknown shape.
///
/// Wraps the full JSON value so the original frame can be handed onward
/// (to a reply slot or a listener queue) without re-parsing.
#[derive(Debug, Clone)]
pub struct Frame {
    value: Value,
}

impl Frame {
    /// Parses a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the text is not valid
    /// JSON. Callers forward unparseable frames verbatim.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Ok(Self { value })
    }

    /// Wraps an already-parsed frame value.
    #[inline]
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        Self { value }
    }

    /// The command id, if this frame carries one.
    ///
    /// A frame with a non-integer `id` is treated as having none.
    #[inline]
    #[must_use]
    pub fn id(&self) -> Option<u64> {
        self.value.get("id").and_then(Value::as_u64)
    }

    /// The event or command method, if present and non-empty.
    #[inline]
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        self.value
            .get("method")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
    }

    /// Returns `true` if this frame is a response (has an id).
    #[inline]
    #[must_use]
    pub fn is_response(&self) -> bool {
        self.id().is_some()
    }

    /// Returns `true` if this frame is an event (method, no id).
    #[inline]
    #[must_use]
    pub fn is_event(&self) -> bool {
        self.id().is_none() && self.method().is_some()
    }

    /// Returns `true` if this frame carries an error field.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.value.get("error").is_some()
    }

    /// The `result` payload of a success response.
    #[inline]
    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        self.value.get("result")
    }

    /// Normalizes the `error` field into an [`ErrorData`] descriptor.
    ///
    /// Browsers send either a structured `{error, message}` object or a
    /// bare string; both shapes are accepted.
    #[must_use]
    pub fn error_data(&self) -> Option<ErrorData> {
        let raw = self.value.get("error")?;
        Some(ErrorData::from_value(raw))
    }

    /// Consumes the frame, returning the underlying JSON value.
    #[inline]
    #[must_use]
    pub fn into_value(self) -> Value {
        self.value
    }

    /// Extracts the `result` payload, surfacing an error frame as a
    /// browser error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Browser`](crate::Error::Browser) if the frame
    /// carries an error field.
    pub fn into_result(self) -> Result<Value> {
        if let Some(data) = self.error_data() {
            return Err(crate::error::Error::browser(data.code, data.message));
        }
        Ok(self
            .value
            .get("result")
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Borrows the underlying JSON value.
    #[inline]
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }
}

// ============================================================================
// ErrorData
// ============================================================================

/// Normalized BiDi error descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorData {
    /// Short error code (e.g. "no such frame").
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl ErrorData {
    fn from_value(raw: &Value) -> Self {
        match raw {
            Value::String(s) => Self {
                code: s.clone(),
                message: s.clone(),
            },
            Value::Object(map) => {
                let code = map
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string();
                let message = map
                    .get("message")
                    .and_then(Value::as_str)
                    .map_or_else(|| code.clone(), ToString::to_string);
                Self { code, message }
            }
            other => Self {
                code: "unknown error".to_string(),
                message: other.to_string(),
            },
        }
    }
}

// ============================================================================
// CommandFrame
// ============================================================================

/// An outbound BiDi command frame.
///
/// Used for router-originated commands; client commands are forwarded as
/// raw text and never re-encoded.
#[derive(Debug, Clone, Serialize)]
pub struct CommandFrame<'a> {
    /// Command id from the router-owned id range.
    pub id: u64,
    /// BiDi method, e.g. `script.callFunction`.
    pub method: &'a str,
    /// Method parameters.
    pub params: Value,
}

impl CommandFrame<'_> {
    /// Serializes the command to its wire form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) on serialization failure.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Tests
// ============================================================================
