//! WebSocket transport layer.
//!
//! This module upgrades HTTP requests to WebSocket sessions and pumps
//! frames between each connection and its handler.
//!
//! # Architecture
//!
//! ```text
//!                   ┌──────────────── Session ────────────────┐
//!                   │                                         │
//!  ┌──────────┐     │  ┌──────────────┐  inbound (cap 1)      │
//!  │          │────────►│ InboundPump  │───────────────────┐  │
//!  │  Client  │     │  └──────┬───────┘                   ▼  │
//!  │          │     │         │ ping            ┌─────────────┐
//!  │          │     │         ▼                 │   Handler   │
//!  │          │◄────────┌──────────────┐◄──────└─────────────┘
//!  └──────────┘     │  │ OutboundPump │  outbound (cap 1)     │
//!                   │  └──────────────┘                       │
//!                   └─────────────────────────────────────────┘
//! ```
//!
//! # Session Lifecycle
//!
//! 1. `Server` accepts a TCP connection and runs the handshake
//! 2. `Session::open` creates the session in `Open`
//! 3. `Session::run` spawns both pumps and invokes the handler
//! 4. The first shutdown signal moves the session to `Closing`
//! 5. Pumps exit, handler returns, transport is closed: `Closed`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `pump` | Inbound and outbound pump tasks |
//! | `server` | Upgrader, endpoint registrar and accept loop |
//! | `session` | Session lifecycle and shutdown coordination |

// ============================================================================
// Submodules
// ============================================================================

/// Inbound and outbound pump tasks.
pub(crate) mod pump;

/// Upgrader, endpoint registrar and accept loop.
pub mod server;

/// Session lifecycle and shutdown coordination.
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use server::{Server, ServerBuilder};
pub use session::{PAYLOAD_CHANNEL_CAPACITY, Session, SessionHandle, SessionStatus};
