use std::path::PathBuf;

use thiserror::Error;

/// A convenience `Result` alias using [`LexfuseError`].
pub type LexfuseResult<T> = Result<T, LexfuseError>;

/// Top-level error type for the Lexfuse retrieval core.
///
/// Validation errors are surfaced to the caller as-is. Corrupt checkpoints and
/// collaborator timeouts are recoverable: the index falls back to an empty
/// state and the retriever degrades to the ranking it still has.
#[derive(Error, Debug)]
pub enum LexfuseError {
    /// Malformed input, e.g. an empty or duplicate document id.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An operation referenced an id or version that does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A checkpoint failed schema or integrity validation.
    #[error("Corrupt state in {}: {reason}", path.display())]
    CorruptState {
        /// File that failed validation.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// An external collaborator did not answer within its deadline.
    #[error("Dependency '{dependency}' timed out after {timeout_ms} ms")]
    DependencyTimeout {
        /// Name of the collaborator.
        dependency: String,
        /// Deadline that was exceeded.
        timeout_ms: u64,
    },

    /// An external collaborator failed for a reason other than a timeout.
    #[error("Dependency error: {0}")]
    Dependency(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LexfuseError {
    /// Shorthand for [`LexfuseError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Shorthand for [`LexfuseError::CorruptState`].
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptState {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether callers are expected to recover from this error (fall back or
    /// degrade) instead of failing the whole request.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::CorruptState { .. } | Self::DependencyTimeout { .. } | Self::Dependency(_)
        )
    }
}
