//! Session lifecycle and shutdown coordination.
//!
//! A [`Session`] is created after a successful upgrade and driven to
//! completion by [`Session::run`], which spawns the two pumps, invokes the
//! handler and coordinates teardown.
//!
//! # Lifecycle
//!
//! ```text
//! Open ──(first shutdown signal)──► Closing ──(pumps joined, handler returned)──► Closed
//! ```
//!
//! Status only moves forward. The first signal wins; later ones are logged
//! and dropped. The transport is released once, after both pumps have
//! handed back their halves.

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{FutureExt, Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinError;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, info, trace, warn};

use crate::config::UpgraderConfig;
use crate::error::Error;
use crate::handler::Handler;
use crate::identifiers::SessionId;
use crate::protocol::{Payload, QueryParams, ShutdownOrigin, ShutdownRequester, ShutdownSignal};

use super::pump::{InboundPump, OutboundPump};

// ============================================================================
// Constants
// ============================================================================

/// Capacity of the inbound and outbound payload channels.
///
/// A single slot per direction: a slow handler holds back the peer, a slow
/// peer holds back the handler.
pub const PAYLOAD_CHANNEL_CAPACITY: usize = 1;

/// Capacity of the ping-to-pong request channel.
const KEEPALIVE_CHANNEL_CAPACITY: usize = 1;

// ============================================================================
// SessionStatus
// ============================================================================

/// Lifecycle state of a session.
///
/// `Closing` and `Closed` record which participant ended the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Pumps and handler are running.
    Open,
    /// Shutdown signalled; waiting for pumps and handler to finish.
    Closing(ShutdownOrigin),
    /// Transport released.
    Closed(ShutdownOrigin),
}

impl SessionStatus {
    /// Returns `true` while no shutdown has been signalled.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` once the transport has been released.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }

    /// Participant that ended the session, if any.
    #[inline]
    #[must_use]
    pub fn origin(&self) -> Option<ShutdownOrigin> {
        match self {
            Self::Open => None,
            Self::Closing(origin) | Self::Closed(origin) => Some(*origin),
        }
    }
}

/// Resolves once the status has left `Open`.
///
/// Also resolves if the status channel is gone, so a pump can never outlive
/// its coordinator.
pub(crate) async fn closing(status: &mut watch::Receiver<SessionStatus>) {
    let _ = status.wait_for(|s| !s.is_open()).await;
}

// ============================================================================
// SessionHandle
// ============================================================================

/// Read-only view of a session, usable from outside its tasks.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    identity: String,
    status: watch::Receiver<SessionStatus>,
    keepalive: watch::Receiver<Instant>,
}

impl SessionHandle {
    /// Session ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Client identity.
    #[inline]
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Current keepalive deadline.
    #[must_use]
    pub fn keepalive_deadline(&self) -> Instant {
        *self.keepalive.borrow()
    }

    /// Waits until the keepalive deadline moves.
    ///
    /// Returns the new deadline, or `None` once the session is gone.
    pub async fn keepalive_extended(&mut self) -> Option<Instant> {
        self.keepalive.changed().await.ok()?;
        Some(*self.keepalive.borrow_and_update())
    }

    /// Waits until the session is closed and returns the final status.
    pub async fn closed(&mut self) -> SessionStatus {
        if let Ok(status) = self.status.wait_for(SessionStatus::is_closed).await {
            return *status;
        }
        *self.status.borrow()
    }
}

// ============================================================================
// Session
// ============================================================================

/// Per-client session state.
///
/// Owns the status channel; pumps and observers only hold receivers.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    identity: String,
    pong_grace: Duration,
    status: watch::Sender<SessionStatus>,
    /// Shared with the outbound pump, the only writer.
    keepalive: Arc<watch::Sender<Instant>>,
}

impl Session {
    /// Opens a session for `identity`.
    ///
    /// The keepalive deadline starts one grace window from now.
    #[must_use]
    pub fn open(identity: impl Into<String>, config: &UpgraderConfig) -> Self {
        let (status, _) = watch::channel(SessionStatus::Open);
        let (keepalive, _) = watch::channel(Instant::now() + config.pong_grace);

        Self {
            id: SessionId::next(),
            identity: identity.into(),
            pong_grace: config.pong_grace,
            status,
            keepalive: Arc::new(keepalive),
        }
    }

    /// Session ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Client identity.
    #[inline]
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Returns a read-only view of this session.
    #[must_use]
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            id: self.id,
            identity: self.identity.clone(),
            status: self.status.subscribe(),
            keepalive: self.keepalive.subscribe(),
        }
    }

    /// Moves `Open` to `Closing`.
    ///
    /// Returns `false` if shutdown had already begun; the call is then a
    /// no-op.
    pub(crate) fn begin_close(&self, origin: ShutdownOrigin) -> bool {
        self.status.send_if_modified(|status| match status {
            SessionStatus::Open => {
                *status = SessionStatus::Closing(origin);
                true
            }
            SessionStatus::Closing(_) | SessionStatus::Closed(_) => false,
        })
    }

    /// Moves `Closing` to `Closed`.
    ///
    /// Returns `false` from any other state.
    pub(crate) fn finish_close(&self) -> bool {
        self.status.send_if_modified(|status| match status {
            SessionStatus::Closing(origin) => {
                *status = SessionStatus::Closed(*origin);
                true
            }
            SessionStatus::Open | SessionStatus::Closed(_) => false,
        })
    }

    /// Drives the session to completion.
    ///
    /// Spawns the inbound and outbound pumps over `transport`, invokes
    /// `handler`, acts on the first shutdown signal, then waits for both
    /// pumps and releases the transport. Returns once the handler has
    /// returned and the session is closed.
    ///
    /// A panicking handler counts as a handler request carrying the panic
    /// message; the session still closes.
    pub async fn run<S, H>(self, transport: S, query: QueryParams, handler: &H) -> SessionStatus
    where
        S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError>,
        S: Unpin + Send + 'static,
        H: Handler + ?Sized,
    {
        let (inbound_tx, inbound_rx) = mpsc::channel(PAYLOAD_CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(PAYLOAD_CHANNEL_CAPACITY);
        let (keepalive_tx, keepalive_rx) = mpsc::channel(KEEPALIVE_CHANNEL_CAPACITY);
        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();
        let (notify_tx, notify_rx) = mpsc::channel(1);

        let (writer, reader) = transport.split();

        let inbound = tokio::spawn(
            InboundPump {
                reader,
                session_id: self.id,
                inbound_tx,
                keepalive_tx,
                signals: signal_tx.clone(),
                status: self.status.subscribe(),
            }
            .run(),
        );

        let outbound = tokio::spawn(
            OutboundPump {
                writer,
                session_id: self.id,
                outbound_rx,
                keepalive_rx,
                keepalive: Arc::clone(&self.keepalive),
                signals: signal_tx.clone(),
                status: self.status.subscribe(),
                pong_grace: self.pong_grace,
            }
            .run(),
        );

        info!(session = %self.id, identity = %self.identity, "Session opened");

        let requester = ShutdownRequester::new(signal_tx);
        let handler_done = AssertUnwindSafe(handler.handle(
            self.identity.clone(),
            query,
            inbound_rx,
            outbound_tx,
            requester,
            notify_rx,
        ))
        .catch_unwind();
        tokio::pin!(handler_done);

        let mut notify_tx = Some(notify_tx);

        loop {
            tokio::select! {
                outcome = &mut handler_done => {
                    if let Err(panic) = outcome {
                        let message = panic_message(&*panic);
                        error!(session = %self.id, identity = %self.identity, %message, "Handler panicked");
                        self.on_signal(
                            ShutdownSignal::handler_request(Some(Error::handler_request(message))),
                            &mut notify_tx,
                        );
                    }
                    break;
                }
                Some(signal) = signal_rx.recv() => self.on_signal(signal, &mut notify_tx),
            }
        }

        // Signals raised while the handler was returning still take precedence
        // over the implicit request below.
        while let Ok(signal) = signal_rx.try_recv() {
            self.on_signal(signal, &mut notify_tx);
        }
        drop(signal_rx);
        drop(notify_tx);

        if self.begin_close(ShutdownOrigin::HandlerRequest) {
            debug!(session = %self.id, "Handler returned while session was open");
        }

        let (reader, writer) = tokio::join!(inbound, outbound);
        self.release(reader, writer).await;

        self.finish_close();
        let status = self.status();
        info!(session = %self.id, identity = %self.identity, ?status, "Session closed");
        status
    }

    /// Acts on a shutdown signal.
    ///
    /// Only the first signal moves the session to `Closing` and reaches the
    /// handler; the rest are dropped.
    fn on_signal(
        &self,
        signal: ShutdownSignal,
        notify_tx: &mut Option<mpsc::Sender<ShutdownSignal>>,
    ) {
        if !self.begin_close(signal.origin) {
            trace!(session = %self.id, origin = %signal.origin, "Redundant shutdown signal");
            return;
        }

        match &signal.error {
            Some(e) if signal.is_transport_fault() => warn!(
                session = %self.id,
                identity = %self.identity,
                origin = %signal.origin,
                error = %e,
                "Session transport failed"
            ),
            Some(e) => info!(
                session = %self.id,
                identity = %self.identity,
                reason = %e,
                "Handler ended session"
            ),
            None => debug!(
                session = %self.id,
                identity = %self.identity,
                origin = %signal.origin,
                "Session shutting down"
            ),
        }

        if let Some(tx) = notify_tx.take() {
            // Capacity 1 and a fresh channel: only fails if the handler
            // dropped its receiver.
            let _ = tx.try_send(signal);
        }
    }

    /// Reunites the transport halves and closes the transport.
    async fn release<S>(
        &self,
        reader: Result<SplitStream<S>, JoinError>,
        writer: Result<SplitSink<S, Message>, JoinError>,
    ) where
        S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
    {
        match (reader, writer) {
            (Ok(reader), Ok(writer)) => match reader.reunite(writer) {
                Ok(mut transport) => {
                    if let Err(e) = transport.close().await {
                        debug!(session = %self.id, error = %e, "Transport close reported an error");
                    }
                    trace!(session = %self.id, "Transport released");
                }
                Err(_) => error!(session = %self.id, "Transport halves do not belong together"),
            },
            (reader, writer) => {
                if let Err(e) = reader {
                    error!(session = %self.id, error = %e, "Inbound pump task failed");
                }
                if let Err(e) = writer {
                    error!(session = %self.id, error = %e, "Outbound pump task failed");
                }
            }
        }
    }
}

/// Text of a panic payload, if it carries any.
fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================
