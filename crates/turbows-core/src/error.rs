//! Engine error types.

use thiserror::Error;
use turbows_protocol::{BufferOverflow, FramingError};
use turbows_transport_traits::TransportError;

/// Error type returned by application callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for application callbacks.
pub type HandlerResult = Result<(), BoxError>;

/// Result type for connection read processing.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Registration failed. Reported synchronously to whoever registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DeploymentError {
    /// Another application already matches exactly the same paths.
    #[error("Path {added} is equivalent to already registered path {existing}")]
    EquivalentPath {
        /// Template being registered
        added: String,
        /// Template it conflicts with
        existing: String,
    },

    /// The path template does not parse.
    #[error("Invalid path template {template:?}: {reason}")]
    InvalidPathTemplate {
        /// The template as given
        template: String,
        /// What is wrong with it
        reason: String,
    },

    /// The application or engine is misconfigured.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A connection stopped processing input.
///
/// Every variant except `Closed` means the connection has just been closed
/// because of this error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConnectionError {
    /// The connection was already closed.
    #[error("Connection closed")]
    Closed,

    /// The peer sent a malformed frame.
    #[error(transparent)]
    Framing(#[from] FramingError),

    /// The peer sent more unconsumed data than the buffer allows.
    #[error(transparent)]
    Overflow(#[from] BufferOverflow),

    /// The transport failed underneath the connection.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// An application callback failed and the connection was closed.
    #[error("Application handler failed: {0}")]
    Handler(String),
}

impl From<ConnectionError> for TransportError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::Closed => Self::Closed,
            ConnectionError::Transport(inner) => inner,
            other => Self::ProtocolError(other.to_string()),
        }
    }
}
