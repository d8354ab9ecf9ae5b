//! Error types for momentum-engine.

use thiserror::Error;

/// Engine error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Domain-level error from momentum-core.
    #[error(transparent)]
    Core(#[from] momentum_core::Error),

    /// A git subcommand exited unsuccessfully.
    #[error("git {operation} failed: {stderr}")]
    Git {
        /// The operation being attempted.
        operation: String,
        /// Captured stderr, trimmed.
        stderr: String,
    },

    /// A subprocess could not be spawned at all.
    #[error("failed to run {operation}: {source}")]
    Spawn {
        /// The operation being attempted.
        operation: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An operation's precondition did not hold; nothing was changed.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// A named resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Memory store failure.
    #[error("memory store error: {0}")]
    Store(String),

    /// The injected AI capability failed.
    #[error("provider error: {0}")]
    Provider(String),

    /// A conflicted file could not be resolved within the retry budget.
    #[error("conflict resolution failed for '{file}': {reason}")]
    ResolutionFailed {
        /// The conflicted file.
        file: String,
        /// Final rejection reason.
        reason: String,
    },
}

/// Result type alias for momentum-engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_error_display() {
        let err = Error::Git {
            operation: "merge".to_string(),
            stderr: "CONFLICT".to_string(),
        };
        assert_eq!(err.to_string(), "git merge failed: CONFLICT");
    }

    #[test]
    fn test_core_error_is_transparent() {
        let core = momentum_core::Error::DuplicateTask("a".to_string());
        let err = Error::from(core.clone());
        assert_eq!(err.to_string(), core.to_string());
    }
}
