//! Error types for the storage engine.

use thiserror::Error;

/// Errors that can occur in the storage engine.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The resource identifier cannot be used as a key segment.
    #[error("invalid resource id: {0:?}")]
    InvalidResourceId(String),

    /// The namespace cannot be used as a key prefix.
    #[error("invalid namespace: {0:?}")]
    InvalidNamespace(String),

    /// An object key is malformed or escapes the store root.
    #[error("invalid object key: {0:?}")]
    InvalidKey(String),

    /// A partition exists but could not be decoded.
    #[error("corrupt partition {key}: {reason}")]
    Corrupt {
        /// Object key of the partition.
        key: String,
        /// What went wrong.
        reason: String,
    },

    /// A partition could not be written after all attempts.
    #[error("failed to write partition {key} after {attempts} attempt(s): {reason}")]
    WriteFailed {
        /// Object key of the partition.
        key: String,
        /// Number of attempts made.
        attempts: u32,
        /// Last error seen.
        reason: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
