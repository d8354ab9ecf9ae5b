//! Event types emitted by the engine.
//!
//! The engine never prints or logs on its own behalf; everything a UI needs
//! flows through these events and the status objects returned by operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::TaskId;

/// The kind of an engine event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// An agent subprocess was spawned.
    #[serde(rename = "agent:spawn")]
    AgentSpawn,
    /// An agent produced stdout output.
    #[serde(rename = "agent:output")]
    AgentOutput,
    /// An agent produced stderr output.
    #[serde(rename = "agent:error")]
    AgentError,
    /// An agent reached a terminal state.
    #[serde(rename = "agent:complete")]
    AgentComplete,
    /// An agent completed but its QA loop failed.
    #[serde(rename = "agent:qa_failed")]
    AgentQaFailed,
    /// A stage began dispatching.
    #[serde(rename = "stage:start")]
    StageStart,
    /// A stage reached quiescence.
    #[serde(rename = "stage:complete")]
    StageComplete,
    /// The dependency resolver produced a staged plan.
    #[serde(rename = "dependency:resolved")]
    DependencyResolved,
    /// A message crossed the agent bus.
    #[serde(rename = "agent:message")]
    AgentMessage,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AgentSpawn => "agent:spawn",
            Self::AgentOutput => "agent:output",
            Self::AgentError => "agent:error",
            Self::AgentComplete => "agent:complete",
            Self::AgentQaFailed => "agent:qa_failed",
            Self::StageStart => "stage:start",
            Self::StageComplete => "stage:complete",
            Self::DependencyResolved => "dependency:resolved",
            Self::AgentMessage => "agent:message",
        };
        write!(f, "{s}")
    }
}

/// An event in the engine's outbound stream.
///
/// Event emissions per agent are totally ordered:
/// spawn, then output/error interleavings, then complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event kind.
    pub kind: EventKind,
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
    /// Related task, when the event concerns a single agent.
    pub task: Option<TaskId>,
    /// Related stage index, when the event concerns a stage.
    pub stage: Option<usize>,
    /// Structured payload.
    pub data: Option<serde_json::Value>,
    /// Human-readable message.
    pub message: String,
}

impl Event {
    /// Create a new event stamped with the current time.
    #[must_use]
    pub fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            task: None,
            stage: None,
            data: None,
            message: message.into(),
        }
    }

    /// Set the related task.
    #[must_use]
    pub fn with_task(mut self, task: TaskId) -> Self {
        self.task = Some(task);
        self
    }

    /// Set the related stage index.
    #[must_use]
    pub const fn with_stage(mut self, stage: usize) -> Self {
        self.stage = Some(stage);
        self
    }

    /// Attach a structured payload.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}
