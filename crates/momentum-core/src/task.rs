//! Task and identifier domain types.

use serde::{Deserialize, Serialize};

/// Unique task identifier, stable within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Create a new task ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Unique agent identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Create a new agent ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical worktree name. The branch label is always derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorktreeName(String);

impl WorktreeName {
    /// Create a new worktree name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The branch label for this worktree: `worktree/<name>`.
    #[must_use]
    pub fn branch(&self) -> String {
        format!("worktree/{}", self.0)
    }
}

impl std::fmt::Display for WorktreeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&TaskId> for WorktreeName {
    fn from(id: &TaskId) -> Self {
        Self(id.as_str().to_string())
    }
}

/// Per-task configuration flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Whether the QA loop runs after the agent exits successfully.
    #[serde(default = "default_qa")]
    pub qa: bool,
    /// Per-task override of the QA iteration cap.
    #[serde(default)]
    pub qa_max_iterations: Option<u32>,
}

const fn default_qa() -> bool {
    true
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            qa: true,
            qa_max_iterations: None,
        }
    }
}

/// A unit of work submitted to the engine.
///
/// Tasks are value types owned by the caller and immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Stable identifier, unique within a run.
    pub id: TaskId,
    /// Human-readable name.
    pub name: String,
    /// Prompt text handed to the coding agent.
    pub prompt: String,
    /// Identifiers of tasks that must complete first.
    #[serde(default)]
    pub depends_on: Vec<TaskId>,
    /// Configuration flags.
    #[serde(default)]
    pub config: TaskConfig,
}

impl Task {
    /// Create a new task with no dependencies and default config.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: TaskId::new(id),
            name: name.into(),
            prompt: prompt.into(),
            depends_on: Vec::new(),
            config: TaskConfig::default(),
        }
    }

    /// Add dependency identifiers.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = TaskId>) -> Self {
        self.depends_on.extend(deps);
        self
    }

    /// Replace the task configuration.
    #[must_use]
    pub fn with_config(mut self, config: TaskConfig) -> Self {
        self.config = config;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worktree_branch_derivation() {
        let name = WorktreeName::new("auth-service");
        assert_eq!(name.branch(), "worktree/auth-service");
    }

    #[test]
    fn test_task_builder() {
        let task = Task::new("t1", "Task one", "do the thing")
            .with_dependencies([TaskId::new("t0")])
            .with_config(TaskConfig {
                qa: false,
                qa_max_iterations: Some(3),
            });
        assert_eq!(task.id.as_str(), "t1");
        assert_eq!(task.depends_on.len(), 1);
        assert!(!task.config.qa);
    }

    #[test]
    fn test_task_config_default_enables_qa() {
        assert!(TaskConfig::default().qa);
    }

    #[test]
    fn test_task_id_serde_is_transparent() {
        let id = TaskId::new("abc");
        let json = serde_json::to_string(&id).unwrap_or_default();
        assert_eq!(json, "\"abc\"");
    }
}
