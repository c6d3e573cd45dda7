//! Shutdown signals.
//!
//! Any participant of a session (inbound pump, outbound pump, handler) can
//! raise a [`ShutdownSignal`]. The session acts on the first one and treats
//! the rest as no-ops.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use tokio::sync::mpsc;

use crate::error::Error;

// ============================================================================
// ShutdownOrigin
// ============================================================================

/// Which participant raised a shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutdownOrigin {
    /// Inbound pump: read error, lost transport or a close frame from the peer.
    InboundFault,
    /// Outbound pump: write error or write deadline exceeded.
    OutboundFault,
    /// The handler asked to end the session, or returned.
    HandlerRequest,
}

impl fmt::Display for ShutdownOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InboundFault => "inbound",
            Self::OutboundFault => "outbound",
            Self::HandlerRequest => "handler",
        };
        f.write_str(name)
    }
}

// ============================================================================
// ShutdownSignal
// ============================================================================

/// Notification that a session must terminate.
///
/// `error` is `None` for clean endings (peer close frame, handler request
/// without a reason).
#[derive(Debug)]
pub struct ShutdownSignal {
    /// Participant that raised the signal.
    pub origin: ShutdownOrigin,
    /// Underlying cause, if any.
    pub error: Option<Error>,
}

impl ShutdownSignal {
    /// Creates a signal.
    #[inline]
    #[must_use]
    pub fn new(origin: ShutdownOrigin, error: Option<Error>) -> Self {
        Self { origin, error }
    }

    /// Inbound pump failure.
    #[inline]
    #[must_use]
    pub fn inbound_fault(error: Error) -> Self {
        Self::new(ShutdownOrigin::InboundFault, Some(error))
    }

    /// Peer closed cleanly.
    #[inline]
    #[must_use]
    pub fn peer_closed() -> Self {
        Self::new(ShutdownOrigin::InboundFault, None)
    }

    /// Outbound pump failure.
    #[inline]
    #[must_use]
    pub fn outbound_fault(error: Error) -> Self {
        Self::new(ShutdownOrigin::OutboundFault, Some(error))
    }

    /// Handler-initiated shutdown.
    #[inline]
    #[must_use]
    pub fn handler_request(reason: Option<Error>) -> Self {
        Self::new(ShutdownOrigin::HandlerRequest, reason)
    }

    /// Returns `true` if the signal carries an error.
    #[inline]
    #[must_use]
    pub fn is_fault(&self) -> bool {
        self.error.is_some()
    }

    /// Returns `true` if the transport itself failed.
    #[inline]
    #[must_use]
    pub fn is_transport_fault(&self) -> bool {
        self.origin != ShutdownOrigin::HandlerRequest && self.is_fault()
    }
}

// ============================================================================
// Handler-side channel ends
// ============================================================================

/// Receives the one signal the session acted upon.
///
/// Yields exactly one [`ShutdownSignal`], then `None`.
pub type ShutdownNotify = mpsc::Receiver<ShutdownSignal>;

/// Lets a handler end its own session.
///
/// Every request is tagged [`ShutdownOrigin::HandlerRequest`]; a handler
/// cannot impersonate a pump.
#[derive(Debug, Clone)]
pub struct ShutdownRequester {
    tx: mpsc::UnboundedSender<ShutdownSignal>,
}

impl ShutdownRequester {
    pub(crate) fn new(tx: mpsc::UnboundedSender<ShutdownSignal>) -> Self {
        Self { tx }
    }

    /// Asks the session to shut down.
    ///
    /// Returns `false` if the session has already finished tearing down.
    /// Requests made while the session is closing are ignored.
    pub fn request(&self, reason: Option<Error>) -> bool {
        self.tx.send(ShutdownSignal::handler_request(reason)).is_ok()
    }

    /// Returns `true` once the session no longer accepts requests.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ============================================================================
// Tests
// ============================================================================
