//! Token error types.

use thiserror::Error;

/// Result alias for token operations.
pub type TokenResult<T> = Result<T, TokenError>;

/// Errors from the token store.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The presented token string is not in the store.
    #[error("unknown token")]
    NotFound,

    /// A revoked token cannot transition again.
    #[error("token is revoked")]
    Revoked,

    /// The requested lifetime was zero or above the configured ceiling.
    #[error("duration must be between 1 and {max_secs} seconds, got {requested_secs}")]
    DurationOutOfRange {
        /// Configured ceiling in seconds.
        max_secs: u64,
        /// What the caller asked for.
        requested_secs: u64,
    },

    /// A scope glob failed to parse (empty).
    #[error("invalid scope {0:?}")]
    InvalidScope(String),

    /// Persisting or loading tokens failed.
    #[error(transparent)]
    Storage(#[from] warden_storage::StorageError),

    /// A stored token could not be decoded.
    #[error("corrupt token record: {0}")]
    Corrupt(String),
}
