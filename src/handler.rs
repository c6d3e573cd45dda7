//! Per-session application handlers.
//!
//! A handler is invoked once per upgraded connection and owns the
//! application side of the session for as long as it runs. The session
//! ends (at the latest) when the handler returns.
//!
//! Async closures with the matching signature are handlers too; wrap them
//! in [`handler_fn`] so their parameter types are inferred:
//!
//! ```ignore
//! use activity_pump::handler_fn;
//!
//! server.register_endpoint("/echo", handler_fn(|identity, _query, mut inbound, outbound, _shutdown, mut notify| async move {
//!     loop {
//!         tokio::select! {
//!             _ = notify.recv() => break,
//!             Some(payload) = inbound.recv() => {
//!                 if outbound.send(payload).await.is_err() {
//!                     break;
//!                 }
//!             }
//!         }
//!     }
//!     tracing::debug!(%identity, "echo session finished");
//! }));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::protocol::{Payload, QueryParams, ShutdownNotify, ShutdownRequester};

// ============================================================================
// Handler
// ============================================================================

/// Application logic bound to an endpoint.
///
/// # Channels
///
/// * `inbound` - data payloads from the peer, in receipt order. Capacity 1:
///   the peer is held back until the handler drains it.
/// * `outbound` - payloads to write to the peer. Capacity 1.
/// * `shutdown` - ends the session from the handler side.
/// * `notify` - yields the signal that ended the session, once.
///
/// Implementations should return soon after `notify` yields; the
/// registrar does not return before the handler does.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Runs the application side of one session.
    async fn handle(
        &self,
        identity: String,
        query: QueryParams,
        inbound: mpsc::Receiver<Payload>,
        outbound: mpsc::Sender<Payload>,
        shutdown: ShutdownRequester,
        notify: ShutdownNotify,
    );
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(
            String,
            QueryParams,
            mpsc::Receiver<Payload>,
            mpsc::Sender<Payload>,
            ShutdownRequester,
            ShutdownNotify,
        ) -> Fut
        + Send
        + Sync
        + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(
        &self,
        identity: String,
        query: QueryParams,
        inbound: mpsc::Receiver<Payload>,
        outbound: mpsc::Sender<Payload>,
        shutdown: ShutdownRequester,
        notify: ShutdownNotify,
    ) {
        (self)(identity, query, inbound, outbound, shutdown, notify).await;
    }
}

// ============================================================================
// Closure Helper
// ============================================================================

/// Pins a closure to the handler signature.
///
/// Closure parameter types cannot be inferred through the blanket
/// [`Handler`] impl alone; wrapping the closure here lets the compiler
/// infer them.
#[inline]
pub fn handler_fn<F, Fut>(f: F) -> F
where
    F: Fn(
            String,
            QueryParams,
            mpsc::Receiver<Payload>,
            mpsc::Sender<Payload>,
            ShutdownRequester,
            ShutdownNotify,
        ) -> Fut
        + Send
        + Sync
        + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    f
}
