//! In-process transports for tests.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use futures_util::{Sink, Stream};
use tokio::io::DuplexStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// WebSocket over an in-memory pipe.
pub(crate) type TestStream = WebSocketStream<DuplexStream>;

/// Server and client ends of an already-upgraded connection.
pub(crate) async fn duplex_pair() -> (TestStream, TestStream) {
    let (server, client) = tokio::io::duplex(64 << 10);
    let server = WebSocketStream::from_raw_socket(server, Role::Server, None).await;
    let client = WebSocketStream::from_raw_socket(client, Role::Client, None).await;
    (server, client)
}

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Transport wrapper counting completed closes.
pub(crate) struct CountingTransport<S> {
    inner: S,
    closes: Arc<AtomicUsize>,
}

impl<S> CountingTransport<S> {
    pub(crate) fn new(inner: S) -> (Self, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        let transport = Self {
            inner,
            closes: Arc::clone(&closes),
        };
        (transport, closes)
    }
}

impl<S> Stream for CountingTransport<S>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    type Item = Result<Message, WsError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

impl<S> Sink<Message> for CountingTransport<S>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    type Error = WsError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.get_mut().inner).poll_ready(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
        Pin::new(&mut self.get_mut().inner).start_send(item)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_close(cx);
        if polled.is_ready() {
            this.closes.fetch_add(1, Ordering::SeqCst);
        }
        polled
    }
}

/// How [`FaultyWrites`] misbehaves.
#[derive(Debug, Clone, Copy)]
pub(crate) enum WriteFault {
    /// Every write fails with a broken pipe.
    Fail,
    /// The sink never becomes ready.
    Stall,
}

/// Transport whose reads work but whose writes do not.
pub(crate) struct FaultyWrites<S> {
    inner: S,
    fault: WriteFault,
}

impl<S> FaultyWrites<S> {
    pub(crate) fn new(inner: S, fault: WriteFault) -> Self {
        Self { inner, fault }
    }
}

impl<S> Stream for FaultyWrites<S>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    type Item = Result<Message, WsError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

impl<S: Unpin> Sink<Message> for FaultyWrites<S> {
    type Error = WsError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        match self.fault {
            WriteFault::Fail => Poll::Ready(Ok(())),
            WriteFault::Stall => Poll::Pending,
        }
    }

    fn start_send(self: Pin<&mut Self>, _item: Message) -> Result<(), Self::Error> {
        Err(WsError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "write half broken",
        )))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}
