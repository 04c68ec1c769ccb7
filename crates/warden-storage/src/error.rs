//! Storage error types.

use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing store could not be opened.
    #[error("failed to open store: {0}")]
    Open(String),

    /// A read or write against the backing store failed.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Stored bytes could not be decoded.
    #[error("corrupt record under {namespace}/{key}: {reason}")]
    Corrupt {
        /// Namespace of the bad record.
        namespace: String,
        /// Key of the bad record.
        key: String,
        /// Decoder error text.
        reason: String,
    },
}

impl From<sled::Error> for StorageError {
    fn from(e: sled::Error) -> Self {
        Self::Backend(e.to_string())
    }
}
