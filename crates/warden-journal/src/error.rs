//! Journal error types.

use thiserror::Error;

/// Result alias for journal operations.
pub type JournalResult<T> = Result<T, JournalError>;

/// Errors from the journal.
#[derive(Debug, Error)]
pub enum JournalError {
    /// The journal directory or a day file could not be used.
    #[error("journal io error on {path}: {source}")]
    Io {
        /// The path involved.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A record failed to encode or decode.
    #[error("journal serialization error: {0}")]
    Serialization(String),
}
