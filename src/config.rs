//! Upgrader configuration.
//!
//! Handshake and session settings shared by every endpoint of a server.
//! Built once at startup, validated, then shared read-only behind an `Arc`.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use activity_pump::{OriginPolicy, UpgraderConfig};
//!
//! let config = UpgraderConfig::new()
//!     .with_buffer_sizes(4096, 4096)
//!     .with_origin_policy(OriginPolicy::allow_list(["https://app.example"]))
//!     .with_pong_grace(Duration::from_secs(60));
//!
//! config.validate()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default read buffer size in bytes.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Default write buffer size in bytes.
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 1024;

/// Default maximum size of a single inbound message (64 KiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 << 10;

/// Header consulted for the caller's address when behind a proxy.
pub const DEFAULT_IDENTITY_HEADER: &str = "X-Forwarded-For";

/// Grace window granted after each pong is written.
pub const DEFAULT_PONG_GRACE: Duration = Duration::from_secs(3 * 60);

// ============================================================================
// OriginPolicy
// ============================================================================

/// Which `Origin` headers the upgrader accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OriginPolicy {
    /// Accept every origin.
    #[default]
    AllowAny,

    /// Accept only the listed origins (exact, case-insensitive match).
    ///
    /// Requests without an `Origin` header are still accepted; non-browser
    /// clients do not send one.
    AllowList(Vec<String>),
}

impl OriginPolicy {
    /// Creates an allow-list policy.
    #[must_use]
    pub fn allow_list<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AllowList(origins.into_iter().map(Into::into).collect())
    }

    /// Returns `true` if `origin` may open a session.
    #[must_use]
    pub fn allows(&self, origin: &str) -> bool {
        match self {
            Self::AllowAny => true,
            Self::AllowList(allowed) => allowed.iter().any(|a| a.eq_ignore_ascii_case(origin)),
        }
    }
}

// ============================================================================
// UpgraderConfig
// ============================================================================

/// Process-wide upgrader settings.
///
/// Never mutated once a server is running; sessions read it by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgraderConfig {
    /// Size of the transport read buffer in bytes.
    pub read_buffer_size: usize,

    /// Size of the transport write buffer in bytes.
    pub write_buffer_size: usize,

    /// Largest inbound message accepted before the read fails.
    pub max_message_size: usize,

    /// Origin acceptance policy.
    pub origin_policy: OriginPolicy,

    /// Header carrying the client address.
    pub identity_header: String,

    /// How far each successful pong pushes the keepalive deadline.
    pub pong_grace: Duration,
}

impl Default for UpgraderConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl UpgraderConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            origin_policy: OriginPolicy::AllowAny,
            identity_header: DEFAULT_IDENTITY_HEADER.to_string(),
            pong_grace: DEFAULT_PONG_GRACE,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl UpgraderConfig {
    /// Sets read and write buffer sizes.
    #[inline]
    #[must_use]
    pub fn with_buffer_sizes(mut self, read: usize, write: usize) -> Self {
        self.read_buffer_size = read;
        self.write_buffer_size = write;
        self
    }

    /// Sets the maximum inbound message size.
    #[inline]
    #[must_use]
    pub fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }

    /// Sets the origin policy.
    #[inline]
    #[must_use]
    pub fn with_origin_policy(mut self, policy: OriginPolicy) -> Self {
        self.origin_policy = policy;
        self
    }

    /// Sets the header the client identity is read from.
    #[inline]
    #[must_use]
    pub fn with_identity_header(mut self, header: impl Into<String>) -> Self {
        self.identity_header = header.into();
        self
    }

    /// Sets the pong grace window.
    #[inline]
    #[must_use]
    pub fn with_pong_grace(mut self, grace: Duration) -> Self {
        self.pong_grace = grace;
        self
    }
}

// ============================================================================
// Validation & Conversion
// ============================================================================

impl UpgraderConfig {
    /// Checks the configuration for values the transport cannot use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on zero buffer sizes, a zero message limit,
    /// a zero grace window or an empty identity header.
    pub fn validate(&self) -> Result<()> {
        if self.read_buffer_size == 0 || self.write_buffer_size == 0 {
            return Err(Error::config("buffer sizes must be non-zero"));
        }

        if self.max_message_size == 0 {
            return Err(Error::config("max message size must be non-zero"));
        }

        if self.pong_grace.is_zero() {
            return Err(Error::config("pong grace window must be non-zero"));
        }

        if self.identity_header.trim().is_empty() {
            return Err(Error::config("identity header must not be empty"));
        }

        Ok(())
    }

    /// Transport settings derived from this configuration.
    #[must_use]
    pub fn websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig::default()
            .read_buffer_size(self.read_buffer_size)
            .write_buffer_size(self.write_buffer_size)
            .max_message_size(Some(self.max_message_size))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = UpgraderConfig::default();
        assert_eq!(config.read_buffer_size, 1024);
        assert_eq!(config.write_buffer_size, 1024);
        assert_eq!(config.pong_grace, Duration::from_secs(180));
        assert_eq!(config.identity_header, "X-Forwarded-For");
        assert_eq!(config.origin_policy, OriginPolicy::AllowAny);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let config = UpgraderConfig::new()
            .with_buffer_sizes(4096, 2048)
            .with_max_message_size(1 << 20)
            .with_identity_header("X-Real-Ip")
            .with_pong_grace(Duration::from_secs(30));

        assert_eq!(config.read_buffer_size, 4096);
        assert_eq!(config.write_buffer_size, 2048);
        assert_eq!(config.max_message_size, 1 << 20);
        assert_eq!(config.identity_header, "X-Real-Ip");
        assert_eq!(config.pong_grace, Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_zero_buffers() {
        let config = UpgraderConfig::new().with_buffer_sizes(0, 1024);
        assert!(matches!(config.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_validate_rejects_zero_grace() {
        let config = UpgraderConfig::new().with_pong_grace(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_header() {
        let config = UpgraderConfig::new().with_identity_header("  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_origin_allow_any() {
        assert!(OriginPolicy::AllowAny.allows("https://anything.example"));
    }

    #[test]
    fn test_origin_allow_list() {
        let policy = OriginPolicy::allow_list(["https://app.example"]);
        assert!(policy.allows("https://app.example"));
        assert!(policy.allows("HTTPS://APP.EXAMPLE"));
        assert!(!policy.allows("https://evil.example"));
    }
}
