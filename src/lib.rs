//! Activity Pump - full-duplex WebSocket sessions for live reward updates.
//!
//! This library upgrades client connections to WebSocket sessions and
//! pumps frames between each connection and an application handler,
//! so that user actions and awarded lootboxes reach clients as they
//! happen.
//!
//! # Architecture
//!
//! Every session runs three concurrent participants:
//!
//! - **Inbound pump**: reads frames, forwards data to the handler, asks
//!   for pongs
//! - **Outbound pump**: sole writer; writes handler payloads and pongs
//! - **Handler**: application logic, talking to the pumps over channels
//!
//! Key design principles:
//!
//! - Capacity-1 channels in both directions (backpressure, never drops)
//! - First shutdown signal wins; status only moves forward
//! - The transport is released exactly once, after both pumps exit
//!
//! # Quick Start
//!
//! ```no_run
//! use activity_pump::{Result, Server, UpgraderConfig, handler_fn};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let server = Server::builder()
//!         .config(UpgraderConfig::new())
//!         .bind("0.0.0.0:8080")
//!         .await?;
//!
//!     server.register_endpoint(
//!         "/echo",
//!         handler_fn(|_identity, _query, mut inbound, outbound, _shutdown, mut notify| async move {
//!             loop {
//!                 tokio::select! {
//!                     _ = notify.recv() => break,
//!                     Some(payload) = inbound.recv() => {
//!                         if outbound.send(payload).await.is_err() {
//!                             break;
//!                         }
//!                     }
//!                 }
//!             }
//!         }),
//!     );
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Upgrader configuration |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`feed`] | Record feeds and the feed handler |
//! | [`handler`] | Per-session handler trait |
//! | [`identifiers`] | Session identifiers |
//! | [`protocol`] | Frames, signals and query parameters |
//! | [`transport`] | Server, sessions and pumps |

// ============================================================================
// Modules
// ============================================================================

/// Upgrader configuration.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Record feeds pushed to clients.
pub mod feed;

/// Per-session application handlers.
pub mod handler;

/// Type-safe identifiers.
pub mod identifiers;

/// Frames, shutdown signals and query parameters.
pub mod protocol;

/// WebSocket server, sessions and pumps.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration
pub use config::{OriginPolicy, UpgraderConfig};

// Error types
pub use error::{Error, Result};

// Feeds
pub use feed::{ActionKind, Feed, FeedHandler, Lootbox, LootboxSource, UserAction};

// Handlers
pub use handler::{Handler, handler_fn};

// Identifier types
pub use identifiers::SessionId;

// Protocol types
pub use protocol::{
    CloseReason, DataKind, Payload, QueryParams, ShutdownNotify, ShutdownOrigin,
    ShutdownRequester, ShutdownSignal,
};

// Transport types
pub use transport::{
    PAYLOAD_CHANNEL_CAPACITY, Server, ServerBuilder, Session, SessionHandle, SessionStatus,
};
