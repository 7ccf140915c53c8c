//! Error types for the vibium proxy.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use vibium::{Result, Error};
//!
//! async fn example(session: &Session) -> Result<()> {
//!     let frame = session.send_internal("browsingContext.getTree", params).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Browser lifecycle | [`Error::Launch`], [`Error::Attach`] |
//! | Session | [`Error::SessionClosed`], [`Error::NoContext`] |
//! | Deadlines | [`Error::ElementNotFound`], [`Error::NavigationTimeout`], [`Error::InternalTimeout`] |
//! | Protocol | [`Error::Browser`], [`Error::Protocol`], [`Error::InvalidParams`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |
//!
//! Errors surfaced to an automation client are rendered through
//! [`Error::wire_code`] and `Display` into the extension response envelope.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Browser Lifecycle Errors
    // ========================================================================
    /// Browser process failed to launch.
    ///
    /// Returned when the browser binary cannot be found or spawned, or when
    /// it never announces a BiDi endpoint.
    #[error("failed to launch browser: {message}")]
    Launch {
        /// Description of the launch failure.
        message: String,
    },

    /// BiDi WebSocket attach failed.
    ///
    /// Returned when the connection to a launched browser's BiDi endpoint
    /// cannot be established.
    #[error("failed to connect to browser: {message}")]
    Attach {
        /// Description of the attach failure.
        message: String,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// The session was torn down while an operation was in flight.
    #[error("session closed")]
    SessionClosed,

    /// No browsing context exists in the browser.
    ///
    /// Returned when `browsingContext.getTree` yields an empty context list.
    #[error("no browsing contexts available")]
    NoContext,

    // ========================================================================
    // Deadline Errors
    // ========================================================================
    /// Element polling exhausted the command deadline.
    #[error("timeout after {timeout_ms}ms waiting for '{selector}': element not found")]
    ElementNotFound {
        /// CSS selector that never matched.
        selector: String,
        /// Total command timeout in milliseconds.
        timeout_ms: u64,
    },

    /// A navigation wait stage exhausted the command deadline.
    ///
    /// `stage` names the milestone that was never observed.
    #[error("timeout after {timeout_ms}ms waiting for {stage}")]
    NavigationTimeout {
        /// Wait stage name ("navigation to start", "DOMContentLoaded", "page load").
        stage: &'static str,
        /// Total command timeout in milliseconds.
        timeout_ms: u64,
    },

    /// An internal BiDi command hit the hard response cap.
    ///
    /// Independent of per-command deadlines; guards against a browser that
    /// stops responding entirely.
    #[error("timeout waiting for response to {method}")]
    InternalTimeout {
        /// The BiDi method that went unanswered.
        method: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Error response from the browser, passed through.
    #[error("browser error: {code} - {message}")]
    Browser {
        /// BiDi error code (e.g. "no such frame").
        code: String,
        /// Human-readable message from the browser.
        message: String,
    },

    /// Malformed frame or unexpected response shape from the browser.
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Invalid parameters in an extension command.
    #[error("invalid params: {message}")]
    InvalidParams {
        /// Description of the invalid parameter.
        message: String,
    },

    /// WebSocket connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a launch error.
    #[inline]
    pub fn launch(message: impl Into<String>) -> Self {
        Self::Launch {
            message: message.into(),
        }
    }

    /// Creates an attach error.
    #[inline]
    pub fn attach(message: impl Into<String>) -> Self {
        Self::Attach {
            message: message.into(),
        }
    }

    /// Creates an element-not-found timeout error.
    #[inline]
    pub fn element_not_found(selector: impl Into<String>, timeout_ms: u64) -> Self {
        Self::ElementNotFound {
            selector: selector.into(),
            timeout_ms,
        }
    }

    /// Creates a navigation timeout error for the given wait stage.
    #[inline]
    pub fn navigation_timeout(stage: &'static str, timeout_ms: u64) -> Self {
        Self::NavigationTimeout { stage, timeout_ms }
    }

    /// Creates an internal command timeout error.
    #[inline]
    pub fn internal_timeout(method: impl Into<String>) -> Self {
        Self::InternalTimeout {
            method: method.into(),
        }
    }

    /// Creates a browser error from a BiDi error descriptor.
    #[inline]
    pub fn browser(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Browser {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an invalid-params error.
    #[inline]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates & Wire Mapping
// ============================================================================

impl Error {
    /// Returns `true` if this is a deadline or response-cap timeout.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ElementNotFound { .. }
                | Self::NavigationTimeout { .. }
                | Self::InternalTimeout { .. }
        )
    }

    /// Returns `true` if the underlying transport is gone.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed | Self::SessionClosed | Self::WebSocket(_)
        )
    }

    /// Short error code for the extension response envelope.
    ///
    /// Browser errors pass their BiDi code through unchanged.
    #[must_use]
    pub fn wire_code(&self) -> &str {
        match self {
            Self::Launch { .. } => "launch failed",
            Self::Attach { .. } => "attach failed",
            Self::SessionClosed => "session closed",
            Self::NoContext => "no context",
            Self::ElementNotFound { .. }
            | Self::NavigationTimeout { .. }
            | Self::InternalTimeout { .. } => "timeout",
            Self::Browser { code, .. } => code,
            Self::Protocol { .. } | Self::Json(_) => "protocol error",
            Self::InvalidParams { .. } => "invalid argument",
            Self::ConnectionClosed | Self::WebSocket(_) => "connection closed",
            Self::Io(_) => "io error",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_not_found_display() {
        let err = Error::element_not_found("#nope", 300);
        assert_eq!(
            err.to_string(),
            "timeout after 300ms waiting for '#nope': element not found"
        );
    }

    #[test]
    fn test_navigation_timeout_names_stage() {
        let err = Error::navigation_timeout("page load", 30_000);
        assert_eq!(
            err.to_string(),
            "timeout after 30000ms waiting for page load"
        );

        let err = Error::navigation_timeout("navigation to start", 500);
        assert!(err.to_string().contains("navigation to start"));
    }

    #[test]
    fn test_timeout_wire_code() {
        assert_eq!(Error::element_not_found("#a", 1).wire_code(), "timeout");
        assert_eq!(
            Error::navigation_timeout("DOMContentLoaded", 1).wire_code(),
            "timeout"
        );
        assert_eq!(
            Error::internal_timeout("script.callFunction").wire_code(),
            "timeout"
        );
    }

    #[test]
    fn test_browser_error_code_passthrough() {
        let err = Error::browser("no such frame", "frame gone");
        assert_eq!(err.wire_code(), "no such frame");
        assert_eq!(err.to_string(), "browser error: no such frame - frame gone");
    }

    #[test]
    fn test_is_timeout() {
        assert!(Error::element_not_found("#a", 1).is_timeout());
        assert!(Error::internal_timeout("m").is_timeout());
        assert!(!Error::SessionClosed.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::SessionClosed.is_connection_error());
        assert!(!Error::NoContext.is_connection_error());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(std::io::ErrorKind::NotFound, "no browser");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("not json").unwrap_err();
        let err: Error = json_err.into();
        assert_eq!(err.wire_code(), "protocol error");
    }
}
