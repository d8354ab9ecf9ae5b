//! Agent subprocess runtime: spawn, bounded capture, termination.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio::sync::{broadcast, watch, Mutex};

use momentum_core::{AgentId, Event, EventKind, QaResult, TaskId};

use crate::error::{Error, Result};

/// Agent run state. Advances monotonically:
/// starting -> running -> {completed | failed}, optionally -> `qa_failed`
/// after completed when QA is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Worktree prepared, subprocess not yet spawned.
    Starting,
    /// Subprocess running.
    Running,
    /// Subprocess exited 0 and QA (if enabled) passed.
    Completed,
    /// Subprocess exited non-zero or could not be spawned.
    Failed,
    /// Subprocess exited 0 but the QA loop gave up.
    QaFailed,
}

impl AgentState {
    /// Whether this state is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::QaFailed)
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::QaFailed => write!(f, "qa_failed"),
        }
    }
}

/// Read-only view of a live or finished agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Agent identifier (derived from the task id).
    pub id: AgentId,
    /// The task this agent runs.
    pub task_id: TaskId,
    /// The agent's worktree.
    pub worktree: PathBuf,
    /// Current state.
    pub state: AgentState,
    /// When the agent started.
    pub started_at: DateTime<Utc>,
    /// When the agent reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
    /// Subprocess exit code, when it exited normally.
    pub exit_code: Option<i32>,
}

/// The transferable result of one task's agent run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutcome {
    /// The task.
    pub task_id: TaskId,
    /// Whether the agent completed and QA (if enabled) passed.
    pub success: bool,
    /// Terminal state.
    pub state: AgentState,
    /// Captured output (stdout then stderr), lossily decoded and bounded.
    pub output: String,
    /// Wall time in milliseconds.
    pub duration_ms: u64,
    /// The worktree the agent worked in.
    pub worktree_path: PathBuf,
    /// Exit code, when the subprocess exited normally.
    pub exit_code: Option<i32>,
    /// QA result, when QA ran.
    pub qa: Option<QaResult>,
}

/// What the subprocess produced.
pub(crate) struct AgentRunOutput {
    pub exit_code: Option<i32>,
    pub success: bool,
    pub output: String,
}

/// Spawn the coding-agent subprocess and pump its output until exit or
/// kill signal.
pub(crate) async fn run_subprocess(
    program: &str,
    args: &[String],
    prompt: &str,
    worktree: &PathBuf,
    task_id: &TaskId,
    events: broadcast::Sender<Event>,
    max_output_bytes: usize,
    mut kill_rx: watch::Receiver<bool>,
) -> Result<AgentRunOutput> {
    let mut child = tokio::process::Command::new(program)
        .args(args)
        .arg(prompt)
        .current_dir(worktree)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Spawn {
            operation: format!("agent '{program}'"),
            source: e,
        })?;

    let buffer = Arc::new(Mutex::new(Vec::<u8>::new()));

    let stdout_pump = child.stdout.take().map(|stdout| {
        tokio::spawn(pump(
            stdout,
            EventKind::AgentOutput,
            task_id.clone(),
            events.clone(),
            buffer.clone(),
            max_output_bytes,
        ))
    });
    let stderr_pump = child.stderr.take().map(|stderr| {
        tokio::spawn(pump(
            stderr,
            EventKind::AgentError,
            task_id.clone(),
            events.clone(),
            buffer.clone(),
            max_output_bytes,
        ))
    });

    let status = tokio::select! {
        status = child.wait() => status?,
        _ = kill_rx.changed() => {
            tracing::info!("killing agent for task '{task_id}'");
            let _ = child.start_kill();
            child.wait().await?
        }
    };

    if let Some(handle) = stdout_pump {
        let _ = handle.await;
    }
    if let Some(handle) = stderr_pump {
        let _ = handle.await;
    }

    let captured = buffer.lock().await;
    Ok(AgentRunOutput {
        exit_code: status.code(),
        success: status.success(),
        output: String::from_utf8_lossy(&captured).to_string(),
    })
}

async fn pump<R>(
    mut reader: R,
    kind: EventKind,
    task_id: TaskId,
    events: broadcast::Sender<Event>,
    buffer: Arc<Mutex<Vec<u8>>>,
    cap: usize,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut chunk = [0u8; 8192];
    loop {
        let read = match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(read) => read,
        };
        {
            let mut captured = buffer.lock().await;
            if captured.len() < cap {
                let take = (cap - captured.len()).min(read);
                captured.extend_from_slice(&chunk[..take]);
            }
        }
        let _ = events.send(
            Event::new(kind, String::from_utf8_lossy(&chunk[..read]).to_string())
                .with_task(task_id.clone()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_terminality() {
        assert!(!AgentState::Starting.is_terminal());
        assert!(!AgentState::Running.is_terminal());
        assert!(AgentState::Completed.is_terminal());
        assert!(AgentState::Failed.is_terminal());
        assert!(AgentState::QaFailed.is_terminal());
    }

    #[test]
    fn test_state_wire_names() {
        let json = serde_json::to_string(&AgentState::QaFailed).unwrap_or_default();
        assert_eq!(json, "\"qa_failed\"");
    }
}
