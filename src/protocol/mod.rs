//! Session protocol types.
//!
//! This module defines what crosses the pump boundary: frames read from
//! the transport, items queued for writing, shutdown signals and the
//! query parameters of the upgrade request.
//!
//! # Frame Taxonomy
//!
//! | Frame | Direction | Handling |
//! |-------|-----------|----------|
//! | `Data` (text/binary) | Peer → Handler | Forwarded through the inbound channel |
//! | `Ping` | Peer → Pump | Answered with a pong by the outbound pump |
//! | `Pong` | Peer → Pump | Liveness confirmed, nothing sent |
//! | `Close` | Peer → Pump | Clean shutdown |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame` | Frame classification and outbound items |
//! | `query` | Upgrade request query parameters |
//! | `signal` | Shutdown signals and handler-side channel ends |

// ============================================================================
// Submodules
// ============================================================================

/// Frame classification and outbound items.
pub mod frame;

/// Upgrade request query parameters.
pub mod query;

/// Shutdown signals.
pub mod signal;

// ============================================================================
// Re-exports
// ============================================================================

pub use frame::{CloseReason, DataKind, Frame, OutboundItem, Payload};
pub use query::QueryParams;
pub use signal::{ShutdownNotify, ShutdownOrigin, ShutdownRequester, ShutdownSignal};
