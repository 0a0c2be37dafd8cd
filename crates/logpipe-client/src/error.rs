//! Error types for the log client and its transports.

use logpipe_events::EventError;
use thiserror::Error;

/// Errors returned to code that logs through a [`LogClient`](crate::LogClient).
#[derive(Debug, Error)]
pub enum ClientError {
    /// The buffer is full and the event was dropped.
    #[error("log buffer is full; event dropped")]
    BufferFull,

    /// The client has been closed.
    #[error("log client is closed")]
    Closed,

    /// The event could not be built.
    #[error("invalid event: {0}")]
    InvalidEvent(#[from] EventError),

    /// The client was created outside a tokio runtime.
    #[error("log client requires a running tokio runtime")]
    NoRuntime,

    /// The configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// A transport could not be set up.
    #[error("transport setup failed: {0}")]
    Transport(#[from] DeliveryError),
}

/// Errors raised by a transport while delivering or closing.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The sink answered with an error status.
    #[error("sink returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, if any could be read.
        body: String,
    },

    /// The request could not be completed (DNS, connection refused, reset).
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The send did not complete within its deadline.
    #[error("send timed out")]
    Timeout,

    /// The broker rejected or failed a publish.
    #[error("broker error: {0}")]
    Broker(String),

    /// An event could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Writing to a local stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport has already been closed.
    #[error("transport is closed")]
    Closed,
}

impl DeliveryError {
    /// Returns true if retrying the same request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(err.to_string())
        }
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
