//! Error types for the policy layer.

use thiserror::Error;

/// Result alias for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Errors from rule parsing, template loading, and role resolution.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A rule string failed to parse.
    #[error("invalid rule {rule:?}: {reason}")]
    InvalidRule {
        /// The offending rule string.
        rule: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A template body failed validation.
    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    /// The named template does not exist.
    #[error("unknown template: {0}")]
    UnknownTemplate(String),

    /// A template file could not be read.
    #[error("failed to read template file {path}: {source}")]
    TemplateIo {
        /// The file that failed.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Persisting or loading role assignments failed.
    #[error(transparent)]
    Storage(#[from] warden_storage::StorageError),

    /// A stored role assignment could not be decoded.
    #[error("corrupt role assignment for {agent}: {reason}")]
    CorruptAssignment {
        /// Agent whose record is bad.
        agent: String,
        /// Decoder error text.
        reason: String,
    },
}
