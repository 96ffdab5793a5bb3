//! Transport error types.

use std::time::Duration;
use thiserror::Error;

/// A specialized `Result` type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Represents errors that can occur at the transport boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportError {
    /// The connection has already been closed.
    #[error("Connection closed")]
    Closed,

    /// Failed to establish a connection.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to write bytes to the peer.
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// The opening handshake was rejected or malformed.
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// A protocol-level error occurred on an established connection.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Connection establishment or handshake timed out.
    #[error(
        "Connection timed out after {timeout:?} for operation: {operation}. \
         If this is expected, increase the timeout with \
         `TimeoutConfig {{ {operation}: Duration::from_secs({}) }}`",
        timeout.as_secs() * 2
    )]
    ConnectionTimeout {
        /// The operation that timed out
        operation: String,
        /// The timeout duration that was exceeded
        timeout: Duration,
    },

    /// The transport was configured with invalid parameters.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// An underlying I/O error occurred.
    #[error("IO error: {0}")]
    Io(String),
}

impl TransportError {
    /// Returns `true` if the error means the connection is gone for good.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed | Self::Io(_) | Self::WriteFailed(_))
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
