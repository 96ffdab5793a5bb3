//! Protocol error types.
//!
//! Three failure families live here, each with a different blast radius:
//! [`FramingError`] and [`BufferOverflow`] end one established connection,
//! [`HandshakeError`] ends one upgrade attempt before a connection exists.

use thiserror::Error;
use turbows_transport_traits::{CloseCode, CloseReason};

/// Result type for frame decoding.
pub type FramingResult<T> = Result<T, FramingError>;

/// Result type for handshake operations.
pub type HandshakeResult<T> = Result<T, HandshakeError>;

/// A malformed byte stream on an established connection.
///
/// Carries the close code the connection must be closed with. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("framing error ({code}): {message}")]
pub struct FramingError {
    /// Close code to send to the peer.
    pub code: CloseCode,
    /// What was wrong with the frame.
    pub message: String,
}

impl FramingError {
    /// Create a framing error with an explicit close code.
    pub fn new(code: CloseCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// 1002: the peer violated the framing rules.
    pub fn protocol_error(message: impl Into<String>) -> Self {
        Self::new(CloseCode::ProtocolError, message)
    }

    /// 1007: payload inconsistent with the message type (bad UTF-8).
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::new(CloseCode::InvalidPayload, message)
    }

    /// 1009: message larger than this endpoint accepts.
    pub fn too_big(message: impl Into<String>) -> Self {
        Self::new(CloseCode::TooBig, message)
    }

    /// The close reason to report for this error.
    pub fn close_reason(&self) -> CloseReason {
        CloseReason::new(self.code, self.message.clone())
    }
}

/// Incoming data would grow the accumulation buffer past its configured maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Buffer overflow: {required} bytes required, maximum is {max}")]
pub struct BufferOverflow {
    /// Total buffered bytes the append would have produced.
    pub required: usize,
    /// Configured maximum.
    pub max: usize,
}

impl BufferOverflow {
    /// Overflow closes the connection as an unexpected condition (1011).
    pub fn close_reason(&self) -> CloseReason {
        CloseReason::unexpected(self.to_string())
    }
}

/// The opening handshake failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum HandshakeError {
    /// A required header is absent.
    #[error("Missing required header: {0}")]
    MissingHeader(&'static str),

    /// A header is present but has an unacceptable value.
    #[error("Invalid value for header {name}: {value:?}")]
    InvalidHeader {
        /// Header name
        name: &'static str,
        /// Offending value
        value: String,
    },

    /// The upgrade request did not use GET.
    #[error("Upgrade request must use GET, got {0}")]
    InvalidMethod(String),

    /// `Sec-WebSocket-Key` is not a base64 encoded 16-byte nonce.
    #[error("Sec-WebSocket-Key is not a base64 encoded 16-byte value: {0:?}")]
    InvalidKey(String),

    /// None of the supported protocol versions accepted the request.
    #[error("Unsupported WebSocket version {requested:?}, supported: {}", supported.join(", "))]
    UnsupportedVersion {
        /// Version the peer asked for, if any
        requested: Option<String>,
        /// Wire versions this engine speaks, in priority order
        supported: Vec<&'static str>,
    },

    /// The server answered with something other than 101.
    #[error("Unexpected response status {0}, expected 101 Switching Protocols")]
    UnexpectedStatus(u16),

    /// `Sec-WebSocket-Accept` does not match the key that was sent.
    #[error("Sec-WebSocket-Accept mismatch: expected {expected}, got {actual}")]
    AcceptMismatch {
        /// Value computed from our key
        expected: String,
        /// Value the server sent
        actual: String,
    },

    /// The server selected a sub-protocol the client never offered.
    #[error("Server selected sub-protocol {0:?} which was not requested")]
    UnrequestedSubprotocol(String),

    /// The server enabled an extension the client never offered.
    #[error("Server enabled extension {0:?} which was not requested")]
    UnrequestedExtension(String),

    /// The target URI cannot be used for a WebSocket connection.
    #[error("Invalid WebSocket URI: {0}")]
    InvalidUri(String),

    /// The request was refused by policy.
    #[error("Upgrade rejected: {0}")]
    Rejected(String),
}

impl HandshakeError {
    /// HTTP status code a server returns for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::UnsupportedVersion { .. } => 426,
            Self::Rejected(_) => 403,
            Self::UnexpectedStatus(status) => *status,
            _ => 400,
        }
    }
}
