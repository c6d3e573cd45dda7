//! Inbound and outbound pumps.
//!
//! Each session runs one of each as independent tokio tasks. The inbound
//! pump owns the read half of the transport, the outbound pump owns the
//! write half; they only talk through channels.
//!
//! # Inbound Pump
//!
//! ```text
//! transport ──► classify ──► Data  ──► inbound channel (cap 1, blocks)
//!                        ├─► Ping  ──► keepalive request ──► outbound pump
//!                        ├─► Pong  ──► (liveness confirmed)
//!                        ├─► Close ──► shutdown (clean)
//!                        └─► error ──► shutdown (InboundFault)
//! ```
//!
//! # Outbound Pump
//!
//! Waits on shutdown, keepalive requests and handler payloads, whichever
//! arrives first. Pongs are written under the pong grace deadline and,
//! once written, push the keepalive deadline forward.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, timeout};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::protocol::{Frame, OutboundItem, Payload, ShutdownSignal};

use super::session::{SessionStatus, closing};

// ============================================================================
// Keepalive
// ============================================================================

/// Moves `current` to `candidate` if that is later.
///
/// Returns `true` if the deadline changed. A deadline is never shortened.
#[inline]
pub(crate) fn advance_deadline(current: &mut Instant, candidate: Instant) -> bool {
    if candidate > *current {
        *current = candidate;
        true
    } else {
        false
    }
}

// ============================================================================
// InboundPump
// ============================================================================

/// Read side of a session.
pub(crate) struct InboundPump<R> {
    /// Read half of the transport.
    pub(crate) reader: R,
    /// Session this pump belongs to.
    pub(crate) session_id: SessionId,
    /// Data payloads for the handler.
    pub(crate) inbound_tx: mpsc::Sender<Payload>,
    /// Pong requests for the outbound pump.
    pub(crate) keepalive_tx: mpsc::Sender<Payload>,
    /// Shutdown signals for the coordinator.
    pub(crate) signals: mpsc::UnboundedSender<ShutdownSignal>,
    /// Session status.
    pub(crate) status: watch::Receiver<SessionStatus>,
}

impl<R> InboundPump<R>
where
    R: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
{
    /// Reads frames until shutdown or a terminal frame/error.
    ///
    /// Returns the read half so the session can release the transport.
    pub(crate) async fn run(mut self) -> R {
        debug!(session = %self.session_id, "Inbound pump started");

        loop {
            let next = tokio::select! {
                () = closing(&mut self.status) => {
                    trace!(session = %self.session_id, "Inbound pump observed shutdown");
                    break;
                }
                next = self.reader.next() => next,
            };

            let frame = match next {
                Some(Ok(message)) => match Frame::from_message(message) {
                    Some(frame) => frame,
                    None => continue,
                },

                Some(Err(e)) => {
                    warn!(session = %self.session_id, error = %e, "Failed to read from transport");
                    self.raise(ShutdownSignal::inbound_fault(Error::WebSocket(e)));
                    break;
                }

                None => {
                    debug!(session = %self.session_id, "Transport stream ended");
                    self.raise(ShutdownSignal::inbound_fault(Error::ConnectionClosed));
                    break;
                }
            };

            match frame {
                Frame::Data { kind, payload } => {
                    trace!(session = %self.session_id, ?kind, len = payload.len(), "Data frame received");

                    // Keep reading for control frames once the handler has
                    // stopped receiving; only the payload is dropped.
                    if self.inbound_tx.is_closed() {
                        trace!(session = %self.session_id, "Discarding payload, handler stopped receiving");
                        continue;
                    }

                    if !self.deliver(payload).await {
                        break;
                    }
                }

                Frame::Ping(payload) => {
                    debug!(session = %self.session_id, "Ping received, requesting pong");

                    if !self.request_pong(payload).await {
                        break;
                    }
                }

                Frame::Pong(_) => {
                    trace!(session = %self.session_id, "Pong received");
                }

                Frame::Close(reason) => {
                    debug!(session = %self.session_id, ?reason, "Close frame received");
                    self.raise(ShutdownSignal::peer_closed());
                    break;
                }
            }
        }

        debug!(session = %self.session_id, "Inbound pump terminated");
        self.reader
    }

    /// Hands a payload to the handler, waiting for room in the channel.
    ///
    /// Returns `false` only if the session shut down while waiting. A
    /// handler that dropped its receiver loses the payload, but reading
    /// goes on.
    async fn deliver(&mut self, payload: Payload) -> bool {
        tokio::select! {
            () = closing(&mut self.status) => false,
            sent = self.inbound_tx.send(payload) => {
                if sent.is_err() {
                    debug!(session = %self.session_id, "Handler no longer receives payloads");
                }
                true
            }
        }
    }

    /// Asks the outbound pump to answer a ping.
    async fn request_pong(&mut self, payload: Payload) -> bool {
        tokio::select! {
            () = closing(&mut self.status) => false,
            sent = self.keepalive_tx.send(payload) => sent.is_ok(),
        }
    }

    fn raise(&self, signal: ShutdownSignal) {
        // Coordinator gone means the session is already tearing down.
        let _ = self.signals.send(signal);
    }
}

// ============================================================================
// OutboundPump
// ============================================================================

/// Write side of a session. Sole writer to the transport.
pub(crate) struct OutboundPump<W> {
    /// Write half of the transport.
    pub(crate) writer: W,
    /// Session this pump belongs to.
    pub(crate) session_id: SessionId,
    /// Payloads queued by the handler.
    pub(crate) outbound_rx: mpsc::Receiver<Payload>,
    /// Pong requests from the inbound pump.
    pub(crate) keepalive_rx: mpsc::Receiver<Payload>,
    /// Keepalive deadline, written only here.
    pub(crate) keepalive: Arc<watch::Sender<Instant>>,
    /// Shutdown signals for the coordinator.
    pub(crate) signals: mpsc::UnboundedSender<ShutdownSignal>,
    /// Session status.
    pub(crate) status: watch::Receiver<SessionStatus>,
    /// Deadline for pong writes and keepalive extension.
    pub(crate) pong_grace: Duration,
}

impl<W> OutboundPump<W>
where
    W: Sink<Message, Error = WsError> + Unpin,
{
    /// Writes queued items until shutdown or a write failure.
    ///
    /// Returns the write half so the session can release the transport.
    pub(crate) async fn run(mut self) -> W {
        debug!(session = %self.session_id, "Outbound pump started");

        loop {
            let item = tokio::select! {
                () = closing(&mut self.status) => {
                    trace!(session = %self.session_id, "Outbound pump observed shutdown");
                    break;
                }
                Some(ping) = self.keepalive_rx.recv() => OutboundItem::KeepaliveReply(ping),
                Some(payload) = self.outbound_rx.recv() => OutboundItem::Payload(payload),
            };

            // Shutdown may have landed while the item was being received.
            if !self.status.borrow().is_open() {
                trace!(session = %self.session_id, "Discarding item queued during shutdown");
                break;
            }

            match self.write(item).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    warn!(session = %self.session_id, error = %e, "Failed to write to transport");
                    let _ = self.signals.send(ShutdownSignal::outbound_fault(e));
                    break;
                }
            }
        }

        debug!(session = %self.session_id, "Outbound pump terminated");
        self.writer
    }

    /// Writes one item.
    ///
    /// Returns `Ok(false)` if shutdown interrupted the write.
    async fn write(&mut self, item: OutboundItem) -> Result<bool> {
        match item {
            OutboundItem::Payload(_) => {
                let message = item.into_message();

                tokio::select! {
                    () = closing(&mut self.status) => Ok(false),
                    sent = self.writer.send(message) => {
                        sent?;
                        trace!(session = %self.session_id, "Payload written");
                        Ok(true)
                    }
                }
            }

            OutboundItem::KeepaliveReply(_) => {
                let message = item.into_message();
                let written_at = Instant::now();
                let deadline = written_at + self.pong_grace;

                let sent = tokio::select! {
                    () = closing(&mut self.status) => return Ok(false),
                    sent = timeout(self.pong_grace, self.writer.send(message)) => sent,
                };

                match sent {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => return Err(Error::WebSocket(e)),
                    Err(_) => {
                        let timeout_ms = u64::try_from(self.pong_grace.as_millis()).unwrap_or(u64::MAX);
                        return Err(Error::write_timeout(timeout_ms));
                    }
                }

                let extended = self
                    .keepalive
                    .send_if_modified(|current| advance_deadline(current, deadline));

                debug!(session = %self.session_id, extended, "Pong written");
                Ok(true)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
