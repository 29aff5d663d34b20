//! Centralized error types for RDC.

use thiserror::Error;

/// Reply codes a server uses to reject credentials.
const AUTH_REJECTION_CODES: &[&str] = &["NOAUTH", "WRONGPASS"];

/// Main error type for connection creation.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid channel: {0}")]
    InvalidChannel(String),

    #[error("Failed to connect to Redis for channel \"{channel}\"")]
    ConnectionCreation { channel: String },

    #[error("Redis authentication failed, check the environment variable: {env_key}")]
    Authentication {
        env_key: String,
        #[source]
        source: BackendError,
    },
}

/// Result type for connection operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

impl ConnectionError {
    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an invalid channel error.
    pub fn invalid_channel(msg: impl Into<String>) -> Self {
        Self::InvalidChannel(msg.into())
    }
}

/// A fault raised by the backend client while establishing a connection.
///
/// `code` is the server reply code when there is one (`NOAUTH`, `ERR`, ...).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct BackendError {
    pub code: Option<String>,
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// True when the server refused the connection's credentials.
    ///
    /// Some clients only surface the marker inside the message text, so both
    /// the code and the message are inspected.
    pub fn is_auth_rejection(&self) -> bool {
        AUTH_REJECTION_CODES.iter().any(|marker| {
            self.code.as_deref() == Some(*marker) || self.message.contains(marker)
        })
    }
}
