//! Frame classification and outbound items.
//!
//! Maps transport messages onto the small frame taxonomy the pumps act on,
//! and back again for writes.

// ============================================================================
// Imports
// ============================================================================

use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;

// ============================================================================
// Types
// ============================================================================

/// Raw application payload carried by data frames.
///
/// Handlers interpret the bytes; the pump never inspects them.
pub type Payload = Vec<u8>;

/// Encoding of a data frame as received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    /// UTF-8 text frame.
    Text,
    /// Binary frame.
    Binary,
}

/// Code and reason sent with a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// Numeric close code (RFC 6455 section 7.4).
    pub code: u16,
    /// Human-readable reason, possibly empty.
    pub reason: String,
}

impl From<CloseFrame> for CloseReason {
    fn from(frame: CloseFrame) -> Self {
        Self {
            code: u16::from(frame.code),
            reason: frame.reason.as_str().to_owned(),
        }
    }
}

// ============================================================================
// Frame
// ============================================================================

/// A frame read from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Application data.
    Data {
        /// How the peer encoded the frame.
        kind: DataKind,
        /// Frame body.
        payload: Payload,
    },
    /// Liveness check from the peer.
    Ping(Payload),
    /// Liveness reply from the peer.
    Pong(Payload),
    /// Peer started the close handshake.
    Close(Option<CloseReason>),
}

impl Frame {
    /// Classifies a transport message.
    ///
    /// Returns `None` for raw frames, which the transport only yields
    /// when writing.
    #[must_use]
    pub fn from_message(message: Message) -> Option<Self> {
        let frame = match message {
            Message::Text(text) => Self::Data {
                kind: DataKind::Text,
                payload: text.as_str().as_bytes().to_vec(),
            },
            Message::Binary(bytes) => Self::Data {
                kind: DataKind::Binary,
                payload: bytes.to_vec(),
            },
            Message::Ping(bytes) => Self::Ping(bytes.to_vec()),
            Message::Pong(bytes) => Self::Pong(bytes.to_vec()),
            Message::Close(frame) => Self::Close(frame.map(CloseReason::from)),
            Message::Frame(_) => return None,
        };

        Some(frame)
    }

    /// Returns `true` for ping, pong and close frames.
    #[inline]
    #[must_use]
    pub fn is_control(&self) -> bool {
        !matches!(self, Self::Data { .. })
    }
}

// ============================================================================
// OutboundItem
// ============================================================================

/// Work item for the outbound pump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundItem {
    /// Application payload queued by the handler.
    Payload(Payload),
    /// Reply to a ping, echoing its payload.
    KeepaliveReply(Payload),
}

impl OutboundItem {
    /// Converts the item into the message written to the transport.
    ///
    /// Payloads that are valid UTF-8 go out as text frames, anything else
    /// as binary.
    #[must_use]
    pub fn into_message(self) -> Message {
        match self {
            Self::Payload(payload) => match String::from_utf8(payload) {
                Ok(text) => Message::text(text),
                Err(err) => Message::binary(err.into_bytes()),
            },
            Self::KeepaliveReply(payload) => Message::Pong(payload.into()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
