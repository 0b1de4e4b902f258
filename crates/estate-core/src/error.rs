//! Error types for estate-sync.

use thiserror::Error;

/// Result type alias using estate-sync's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Status reported for failures where no HTTP response was received.
pub const SYNTHETIC_NETWORK_STATUS: u16 = 500;

/// Core error type for estate-sync operations.
#[derive(Error, Debug)]
pub enum Error {
    /// No response reached the client (connect/timeout/DNS failure)
    #[error("Network error: {0}")]
    Network(String),

    /// Backend answered with a non-2xx status
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Malformed token, payload or frame
    #[error("Decode error: {0}")]
    Decode(String),

    /// Invalid input (bad page size, unknown filter column, invalid draft)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Filter column already present in the filter set
    #[error("Duplicate filter column: {0}")]
    DuplicateFilter(String),

    /// Push channel transport failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// HTTP-like status for display, synthesizing 500 for network failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Server { status, .. } => Some(*status),
            Error::Network(_) => Some(SYNTHETIC_NETWORK_STATUS),
            _ => None,
        }
    }

    /// Message suitable for a user-facing notification.
    ///
    /// Server errors surface the backend's own message verbatim.
    pub fn user_message(&self) -> String {
        match self {
            Error::Server { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Error::Server {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None if e.is_decode() => Error::Decode(e.to_string()),
            None => Error::Network(e.to_string()),
        }
    }
}
