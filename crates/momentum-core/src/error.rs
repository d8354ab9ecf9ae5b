//! Error types for momentum-core.

use thiserror::Error;

/// Core error type for domain operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// A task references a dependency id that is not part of the run.
    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency {
        /// The dependent task.
        task: String,
        /// The missing dependency id.
        dependency: String,
    },

    /// Two tasks in the same run share an identifier.
    #[error("duplicate task id '{0}'")]
    DuplicateTask(String),

    /// The dependency graph contains at least one cycle.
    #[error("dependency cycle detected: {}", format_cycles(.cycles))]
    CycleDetected {
        /// Each inner list names the members of one cycle.
        cycles: Vec<Vec<String>>,
    },

    /// Conflicted content could not be parsed.
    #[error("conflict parse error: {0}")]
    Parse(String),

    /// A schema migration could not be applied.
    #[error("migration to version {version} cannot be applied: {reason}")]
    Migration {
        /// Target schema version.
        version: u32,
        /// Why the migration failed.
        reason: String,
    },

    /// Generic validation failure.
    #[error("validation error: {0}")]
    Validation(String),
}

fn format_cycles(cycles: &[Vec<String>]) -> String {
    cycles
        .iter()
        .map(|cycle| cycle.join(" -> "))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias for momentum-core operations.
pub type Result<T> = std::result::Result<T, Error>;
