//! Notification channel error types.

use thiserror::Error;

/// Errors raised while dialing or streaming the notification channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("handshake with {address} timed out after {timeout_ms} ms")]
    DialTimeout { address: String, timeout_ms: u128 },

    #[error("failed to connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    #[error("connection error: {0}")]
    Connection(#[from] quinn::ConnectionError),

    #[error("failed to decode notification: {0}")]
    Decode(String),

    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("receive task failed: {0}")]
    Task(String),
}

impl From<serde_json::Error> for ChannelError {
    fn from(err: serde_json::Error) -> Self {
        ChannelError::Decode(err.to_string())
    }
}

/// Result type for channel operations.
pub type ChannelResult<T> = std::result::Result<T, ChannelError>;
