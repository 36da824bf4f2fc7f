//! Error types for sync-client.

use std::path::PathBuf;
use sync_core::BufferError;
use sync_types::FormatError;

/// Main error type for client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Queue rejected the mutation.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Value could not be serialized or deserialized.
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    /// Storage backend could not be opened.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Key-value storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Backend refused the operation (used by test doubles).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Database path error.
    #[error("invalid database path: {path}")]
    InvalidPath {
        /// The invalid path.
        path: PathBuf,
    },
}

/// Action queue errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Queue already holds `max_pending` actions.
    #[error("queue full (capacity: {capacity})")]
    Full {
        /// Configured capacity.
        capacity: usize,
    },

    /// The mutation cannot be queued as given.
    #[error("invalid mutation: {0}")]
    InvalidMutation(#[source] FormatError),
}

impl From<BufferError> for QueueError {
    fn from(err: BufferError) -> Self {
        match err {
            BufferError::Full { capacity } => Self::Full { capacity },
        }
    }
}

/// Result type alias for client operations.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
