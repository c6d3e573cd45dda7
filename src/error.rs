//! Error types for the session pump.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use activity_pump::{Result, Server, UpgraderConfig};
//!
//! async fn example() -> Result<()> {
//!     let server = Server::builder()
//!         .config(UpgraderConfig::new())
//!         .bind("127.0.0.1:0")
//!         .await?;
//!     println!("listening on {}", server.ws_url("/updates"));
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Handshake | [`Error::Handshake`], [`Error::EndpointNotFound`], [`Error::OriginRejected`] |
//! | Connection | [`Error::ConnectionClosed`], [`Error::WriteTimeout`] |
//! | Session | [`Error::HandlerRequest`], [`Error::Feed`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

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
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when upgrader or server configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Handshake Errors
    // ========================================================================
    /// WebSocket upgrade failed.
    #[error("Handshake failed for {peer}: {message}")]
    Handshake {
        /// Identity or address of the peer that attempted the upgrade.
        peer: String,
        /// Description of the failure.
        message: String,
    },

    /// No endpoint is registered for the requested path.
    #[error("No endpoint registered for path: {path}")]
    EndpointNotFound {
        /// The requested path.
        path: String,
    },

    /// Origin header was rejected by the origin policy.
    #[error("Origin rejected: {origin}")]
    OriginRejected {
        /// The rejected origin.
        origin: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Peer went away without a close handshake.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A frame could not be written within its deadline.
    #[error("Write timed out after {timeout_ms}ms")]
    WriteTimeout {
        /// Milliseconds waited before giving up.
        timeout_ms: u64,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// Reason supplied by a handler that ended its session.
    #[error("Handler requested shutdown: {message}")]
    HandlerRequest {
        /// Reason given by the handler.
        message: String,
    },

    /// Upstream record source failed.
    #[error("Feed error: {message}")]
    Feed {
        /// Description of the feed failure.
        message: String,
    },

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
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a handshake error.
    #[inline]
    pub fn handshake(peer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handshake {
            peer: peer.into(),
            message: message.into(),
        }
    }

    /// Creates an endpoint not found error.
    #[inline]
    pub fn endpoint_not_found(path: impl Into<String>) -> Self {
        Self::EndpointNotFound { path: path.into() }
    }

    /// Creates an origin rejected error.
    #[inline]
    pub fn origin_rejected(origin: impl Into<String>) -> Self {
        Self::OriginRejected {
            origin: origin.into(),
        }
    }

    /// Creates a write timeout error.
    #[inline]
    pub fn write_timeout(timeout_ms: u64) -> Self {
        Self::WriteTimeout { timeout_ms }
    }

    /// Creates a handler request error.
    #[inline]
    pub fn handler_request(message: impl Into<String>) -> Self {
        Self::HandlerRequest {
            message: message.into(),
        }
    }

    /// Creates a feed error.
    #[inline]
    pub fn feed(message: impl Into<String>) -> Self {
        Self::Feed {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this error was raised while upgrading a request.
    #[inline]
    #[must_use]
    pub fn is_handshake_error(&self) -> bool {
        matches!(
            self,
            Self::Handshake { .. } | Self::EndpointNotFound { .. } | Self::OriginRejected { .. }
        )
    }

    /// Returns `true` if this is a transport error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed
                | Self::WriteTimeout { .. }
                | Self::WebSocket(_)
                | Self::Io(_)
        )
    }

    /// Returns `true` if the client may reasonably reconnect after this error.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed | Self::WriteTimeout { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::write_timeout(180_000);
        assert_eq!(err.to_string(), "Write timed out after 180000ms");
    }

    #[test]
    fn test_handshake_display() {
        let err = Error::handshake("203.0.113.7", "missing upgrade header");
        assert_eq!(
            err.to_string(),
            "Handshake failed for 203.0.113.7: missing upgrade header"
        );
    }

    #[test]
    fn test_is_handshake_error() {
        assert!(Error::endpoint_not_found("/nope").is_handshake_error());
        assert!(Error::origin_rejected("https://evil.example").is_handshake_error());
        assert!(!Error::ConnectionClosed.is_handshake_error());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::write_timeout(1000).is_connection_error());
        assert!(!Error::handler_request("done").is_connection_error());
        assert!(!Error::config("bad").is_connection_error());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::ConnectionClosed.is_recoverable());
        assert!(!Error::config("test").is_recoverable());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::BrokenPipe, "pipe closed");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_connection_error());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
