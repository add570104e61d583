//! Error types for the session client

use thiserror::Error;

/// Client error types
///
/// Only construction and configuration paths return these. Runtime HTTP and
/// storage failures are folded into sentinel values or response envelopes.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Failures raised by a key-value storage backend
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A request that never produced an HTTP response
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),
}

impl TransportError {
    /// Synthetic error code placed in the response envelope
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connect(_) => "CONNECTION_FAILED",
            Self::Timeout | Self::Network(_) => "NETWORK_ERROR",
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
