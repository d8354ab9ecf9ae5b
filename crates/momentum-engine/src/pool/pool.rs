//! The bounded-concurrency agent scheduler.
//!
//! Parallel workers with cooperative dispatch: up to `max_agents`
//! subprocesses run at once, each confined to its own worktree. The pool
//! coordinates only at spawn, event emission and completion; agents share
//! no in-process mutable state and talk through the bus.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch, Mutex, Semaphore};

use momentum_core::{resolver, AgentId, Event, EventKind, Task, TaskId, WorktreeName};

use crate::config::{PoolConfig, QaConfig};
use crate::error::Result;
use crate::pool::agent::{self, AgentRecord, AgentState, TaskOutcome};
use crate::pool::bus::AgentBus;
use crate::qa::{FixPlanner, QaRunner};
use crate::worktree::WorktreeManager;

/// Result of one pool run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Per-task outcomes, keyed by task id. Tasks in stages that never
    /// started are absent.
    pub results: BTreeMap<TaskId, TaskOutcome>,
    /// Stages that ran to quiescence.
    pub stages_completed: usize,
    /// Whether a stage failure aborted the remaining stages.
    pub aborted: bool,
}

impl RunReport {
    /// Whether every task that ran succeeded and nothing was aborted.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        !self.aborted && self.results.values().all(|outcome| outcome.success)
    }
}

struct PoolInner {
    config: PoolConfig,
    qa_config: QaConfig,
    worktrees: Arc<WorktreeManager>,
    bus: Arc<AgentBus>,
    fix_planner: std::sync::Mutex<Option<Arc<dyn FixPlanner>>>,
    events: broadcast::Sender<Event>,
    semaphore: Arc<Semaphore>,
    live: Mutex<BTreeMap<TaskId, AgentRecord>>,
    kills: Mutex<HashMap<TaskId, watch::Sender<bool>>>,
    results: Mutex<BTreeMap<TaskId, TaskOutcome>>,
}

/// The agent pool.
pub struct AgentPool {
    inner: Arc<PoolInner>,
}

impl AgentPool {
    /// Create a pool over a worktree manager and a bus.
    #[must_use]
    pub fn new(
        config: PoolConfig,
        qa_config: QaConfig,
        worktrees: Arc<WorktreeManager>,
        bus: Arc<AgentBus>,
    ) -> Self {
        let (events, _) = broadcast::channel(1024);
        bus.attach_events(events.clone());
        let max_agents = config.max_agents.max(1);
        Self {
            inner: Arc::new(PoolInner {
                config,
                qa_config,
                worktrees,
                bus,
                fix_planner: std::sync::Mutex::new(None),
                events,
                semaphore: Arc::new(Semaphore::new(max_agents)),
                live: Mutex::new(BTreeMap::new()),
                kills: Mutex::new(HashMap::new()),
                results: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Inject the AI fix capability used by QA escalation.
    pub fn set_fix_planner(&self, planner: Arc<dyn FixPlanner>) {
        if let Ok(mut guard) = self.inner.fix_planner.lock() {
            *guard = Some(planner);
        }
    }

    /// Subscribe to the engine event stream.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.events.subscribe()
    }

    /// The bus agents communicate over.
    #[must_use]
    pub fn bus(&self) -> Arc<AgentBus> {
        self.inner.bus.clone()
    }

    /// Currently live agents, sorted by task id.
    pub async fn live_agents(&self) -> Vec<AgentRecord> {
        self.inner.live.lock().await.values().cloned().collect()
    }

    /// All recorded results so far.
    pub async fn results(&self) -> BTreeMap<TaskId, TaskOutcome> {
        self.inner.results.lock().await.clone()
    }

    /// Run tasks with no dependency ordering: everything is enqueued at
    /// once and the semaphore bounds concurrency.
    pub async fn run(&self, tasks: Vec<Task>) -> Result<RunReport> {
        resolver::DependencyResolver::build(&tasks)?;
        let outcomes = run_stage(&self.inner, tasks, None).await;
        let mut results = BTreeMap::new();
        for outcome in outcomes {
            results.insert(outcome.task_id.clone(), outcome);
        }
        Ok(RunReport {
            results,
            stages_completed: 1,
            aborted: false,
        })
    }

    /// Run tasks stage by stage per their dependencies.
    ///
    /// Stages execute sequentially; within a stage tasks run concurrently.
    /// A stage failure aborts the remaining stages when `stop_on_failure`
    /// is set.
    pub async fn run_staged(&self, tasks: Vec<Task>) -> Result<RunReport> {
        let plan = resolver::resolve_stages(&tasks)?;
        emit(
            &self.inner,
            Event::new(
                EventKind::DependencyResolved,
                format!("{} task(s) in {} stage(s)", plan.task_count(), plan.stages().len()),
            )
            .with_data(serde_json::json!({"stages": plan.stages().len()})),
        );

        let by_id: HashMap<TaskId, Task> =
            tasks.into_iter().map(|task| (task.id.clone(), task)).collect();

        let mut results = BTreeMap::new();
        let mut stages_completed = 0;
        let mut aborted = false;

        for (index, stage) in plan.stages().iter().enumerate() {
            emit(
                &self.inner,
                Event::new(
                    EventKind::StageStart,
                    format!("stage {index}: {} task(s)", stage.len()),
                )
                .with_stage(index),
            );

            let stage_tasks: Vec<Task> = stage
                .tasks()
                .iter()
                .filter_map(|id| by_id.get(id).cloned())
                .collect();
            let outcomes = run_stage(&self.inner, stage_tasks, Some(index)).await;
            let failed = outcomes.iter().filter(|outcome| !outcome.success).count();

            emit(
                &self.inner,
                Event::new(
                    EventKind::StageComplete,
                    format!("stage {index} complete, {failed} failed"),
                )
                .with_stage(index)
                .with_data(serde_json::json!({
                    "tasks": outcomes.len(),
                    "failed": failed,
                })),
            );

            for outcome in outcomes {
                results.insert(outcome.task_id.clone(), outcome);
            }
            stages_completed += 1;

            if failed > 0 && self.inner.config.stop_on_failure {
                aborted = index + 1 < plan.stages().len();
                if aborted {
                    tracing::warn!("stage {index} failed; aborting remaining stages");
                    break;
                }
            }
        }

        Ok(RunReport {
            results,
            stages_completed,
            aborted,
        })
    }

    /// Terminate every live agent and discard queued tasks. The pool
    /// accepts no further work afterwards.
    pub async fn kill_all(&self) {
        self.inner.semaphore.close();
        for kill in self.inner.kills.lock().await.values() {
            let _ = kill.send(true);
        }
        self.inner.live.lock().await.clear();
        tracing::info!("kill_all: signalled all live agents");
    }
}

fn emit(inner: &PoolInner, event: Event) {
    let _ = inner.events.send(event);
}

async fn run_stage(
    inner: &Arc<PoolInner>,
    tasks: Vec<Task>,
    stage: Option<usize>,
) -> Vec<TaskOutcome> {
    let futures: Vec<_> = tasks
        .into_iter()
        .map(|task| execute_task(inner.clone(), task, stage))
        .collect();
    join_all(futures).await
}

async fn set_live_state(inner: &PoolInner, task_id: &TaskId, state: AgentState) {
    if let Some(record) = inner.live.lock().await.get_mut(task_id) {
        record.state = state;
    }
}

async fn record_outcome(inner: &PoolInner, outcome: TaskOutcome) -> TaskOutcome {
    inner.live.lock().await.remove(&outcome.task_id);
    inner.kills.lock().await.remove(&outcome.task_id);
    inner
        .results
        .lock()
        .await
        .insert(outcome.task_id.clone(), outcome.clone());
    emit(
        inner,
        Event::new(
            EventKind::AgentComplete,
            format!("task '{}' finished: {}", outcome.task_id, outcome.state),
        )
        .with_task(outcome.task_id.clone())
        .with_data(serde_json::json!({
            "success": outcome.success,
            "state": outcome.state,
            "duration_ms": outcome.duration_ms,
        })),
    );
    outcome
}

fn failed_outcome(task_id: TaskId, worktree: std::path::PathBuf, output: String) -> TaskOutcome {
    TaskOutcome {
        task_id,
        success: false,
        state: AgentState::Failed,
        output,
        duration_ms: 0,
        worktree_path: worktree,
        exit_code: None,
        qa: None,
    }
}

async fn execute_task(inner: Arc<PoolInner>, task: Task, stage: Option<usize>) -> TaskOutcome {
    let start = std::time::Instant::now();

    // Bounded concurrency: at most max_agents permits exist.
    let Ok(_permit) = inner.semaphore.clone().acquire_owned().await else {
        return record_outcome(
            &inner,
            failed_outcome(
                task.id.clone(),
                std::path::PathBuf::new(),
                "cancelled before start".to_string(),
            ),
        )
        .await;
    };

    let name = WorktreeName::from(&task.id);
    let worktree = match inner.worktrees.get(&name).await {
        Some(worktree) => worktree,
        None => match inner.worktrees.create(&name, &inner.config.base_branch).await {
            Ok(worktree) => worktree,
            Err(e) => {
                return record_outcome(
                    &inner,
                    failed_outcome(
                        task.id.clone(),
                        std::path::PathBuf::new(),
                        format!("worktree creation failed: {e}"),
                    ),
                )
                .await;
            }
        },
    };

    let record = AgentRecord {
        id: AgentId::new(format!("agent-{}", task.id)),
        task_id: task.id.clone(),
        worktree: worktree.path.clone(),
        state: AgentState::Starting,
        started_at: Utc::now(),
        finished_at: None,
        exit_code: None,
    };
    inner.live.lock().await.insert(task.id.clone(), record);

    let (kill_tx, kill_rx) = watch::channel(false);
    inner.kills.lock().await.insert(task.id.clone(), kill_tx);

    let mut spawn_event = Event::new(
        EventKind::AgentSpawn,
        format!("task '{}' spawned in {}", task.id, worktree.path.display()),
    )
    .with_task(task.id.clone());
    if let Some(stage) = stage {
        spawn_event = spawn_event.with_stage(stage);
    }
    emit(&inner, spawn_event);
    set_live_state(&inner, &task.id, AgentState::Running).await;

    let run = agent::run_subprocess(
        &inner.config.agent_program,
        &inner.config.agent_args,
        &task.prompt,
        &worktree.path,
        &task.id,
        inner.events.clone(),
        inner.config.max_output_bytes,
        kill_rx,
    )
    .await;

    let (mut state, exit_code, output) = match run {
        Ok(result) => (
            if result.success {
                AgentState::Completed
            } else {
                AgentState::Failed
            },
            result.exit_code,
            result.output,
        ),
        Err(e) => (AgentState::Failed, None, format!("agent spawn failed: {e}")),
    };

    let mut qa_result = None;
    if state == AgentState::Completed && task.config.qa && inner.qa_config.enabled {
        let planner = inner
            .fix_planner
            .lock()
            .ok()
            .and_then(|guard| guard.clone());
        let runner = QaRunner::new(inner.qa_config.clone(), planner);
        let cap = task
            .config
            .qa_max_iterations
            .unwrap_or(inner.qa_config.max_iterations);
        match runner.run(&worktree.path, cap).await {
            Ok(qa) => {
                if !qa.passed {
                    state = AgentState::QaFailed;
                    emit(
                        &inner,
                        Event::new(
                            EventKind::AgentQaFailed,
                            format!(
                                "task '{}' failed QA after {} iteration(s)",
                                task.id, qa.iterations
                            ),
                        )
                        .with_task(task.id.clone()),
                    );
                }
                qa_result = Some(qa);
            }
            Err(e) => {
                state = AgentState::QaFailed;
                emit(
                    &inner,
                    Event::new(
                        EventKind::AgentQaFailed,
                        format!("task '{}' QA errored: {e}", task.id),
                    )
                    .with_task(task.id.clone()),
                );
            }
        }
    }

    let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    record_outcome(
        &inner,
        TaskOutcome {
            task_id: task.id.clone(),
            success: state == AgentState::Completed,
            state,
            output,
            duration_ms,
            worktree_path: worktree.path,
            exit_code,
            qa: qa_result,
        },
    )
    .await
}
