//! Error types for the mock pool
//!
//! One `thiserror` enum covers every failure the server can observe. Session
//! code decides per variant whether the failure is local to a line or fatal to
//! the connection.

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Main error type for the mock pool
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A line that parsed as JSON but is not a usable request
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// Inbound line exceeded the framing limit
    #[error("Line exceeds maximum length")]
    LineTooLong,

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Listener/socket setup errors
    #[error("Network error: {0}")]
    Network(String),
}

/// Result type alias for the mock pool
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a malformed request error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedRequest(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Whether this error only invalidates the current line.
    ///
    /// Everything else ends the session.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Json(_) | Self::MalformedRequest(_))
    }

    /// Whether the peer reset the connection
    pub fn is_connection_reset(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::ConnectionReset)
    }
}

impl From<LinesCodecError> for Error {
    fn from(err: LinesCodecError) -> Self {
        match err {
            LinesCodecError::Io(e) => Self::Io(e),
            LinesCodecError::MaxLineLengthExceeded => Self::LineTooLong,
        }
    }
}
