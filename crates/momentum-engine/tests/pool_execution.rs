//! Agent pool integration tests: staging, bounded concurrency, events,
//! cancellation. The "coding agent" is `sh -c <prompt>`, so each task's
//! prompt is the script it runs in its worktree.

// Integration tests have relaxed clippy settings for test ergonomics.
// Production code (src/) must use strict zero-unwrap/panic patterns.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use momentum_core::{Error as CoreError, Event, EventKind, Task, TaskId};
use momentum_engine::{
    AgentBus, AgentPool, AgentState, BusConfig, Error, PoolConfig, QaConfig, WorktreeManager,
};

use common::init_repo;

fn shell_pool_config(max_agents: usize) -> PoolConfig {
    PoolConfig {
        max_agents,
        agent_program: "sh".to_string(),
        agent_args: vec!["-c".to_string()],
        base_branch: "main".to_string(),
        stop_on_failure: true,
        max_output_bytes: 1024 * 1024,
    }
}

async fn shell_pool(repo: &PathBuf, max_agents: usize) -> (Arc<WorktreeManager>, AgentPool) {
    let manager = WorktreeManager::initialize(repo).await.expect("init");
    let bus = Arc::new(AgentBus::new(&BusConfig::default()));
    let qa = QaConfig {
        enabled: false,
        ..QaConfig::default()
    };
    let pool = AgentPool::new(shell_pool_config(max_agents), qa, manager.clone(), bus);
    (manager, pool)
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn position(events: &[Event], kind: EventKind, task: &str) -> usize {
    events
        .iter()
        .position(|e| e.kind == kind && e.task.as_ref().map(TaskId::as_str) == Some(task))
        .unwrap_or_else(|| panic!("missing event {kind} for task {task}"))
}

#[tokio::test]
async fn test_dependency_staging_runs_diamond_in_order() {
    let (_tmp, repo) = init_repo();
    let (manager, pool) = shell_pool(&repo, 4).await;
    let mut rx = pool.subscribe();

    let tasks = vec![
        Task::new("a", "A", "true"),
        Task::new("b", "B", "true").with_dependencies([TaskId::new("a")]),
        Task::new("c", "C", "true").with_dependencies([TaskId::new("a")]),
        Task::new("d", "D", "true")
            .with_dependencies([TaskId::new("b"), TaskId::new("c")]),
    ];

    let report = pool.run_staged(tasks).await.expect("run");
    assert_eq!(report.stages_completed, 3);
    assert!(!report.aborted);
    assert_eq!(report.results.len(), 4);
    assert!(report.all_succeeded());

    let events = drain(&mut rx);

    // D spawns only after both B and C completed.
    let d_spawn = position(&events, EventKind::AgentSpawn, "d");
    assert!(position(&events, EventKind::AgentComplete, "b") < d_spawn);
    assert!(position(&events, EventKind::AgentComplete, "c") < d_spawn);
    // B spawns only after A completed.
    assert!(
        position(&events, EventKind::AgentComplete, "a")
            < position(&events, EventKind::AgentSpawn, "b")
    );

    // Stage events bracket the run.
    assert_eq!(
        events
            .iter()
            .filter(|e| e.kind == EventKind::StageComplete)
            .count(),
        3
    );

    // One worktree per task, on the derived branch.
    assert_eq!(manager.list().await.len(), 4);
    assert!(common::branch_exists(&repo, "worktree/d"));
}

#[tokio::test]
async fn test_bounded_parallelism_never_exceeds_limit() {
    let (_tmp, repo) = init_repo();
    let (_manager, pool) = shell_pool(&repo, 3).await;
    let mut rx = pool.subscribe();

    let tasks: Vec<Task> = (0..10)
        .map(|i| Task::new(format!("t{i:02}"), "sleeper", "sleep 0.3"))
        .collect();

    let started = std::time::Instant::now();
    let report = pool.run(tasks).await.expect("run");
    let elapsed = started.elapsed();

    assert_eq!(report.results.len(), 10);
    assert!(report.all_succeeded());
    // ceil(10/3) waves of 0.3s each.
    assert!(
        elapsed.as_secs_f64() >= 1.0,
        "finished too fast for N=3: {elapsed:?}"
    );

    // Replay events: live agents never exceed the bound.
    let events = drain(&mut rx);
    let mut running = 0i64;
    let mut peak = 0i64;
    for event in &events {
        match event.kind {
            EventKind::AgentSpawn => {
                running += 1;
                peak = peak.max(running);
            }
            EventKind::AgentComplete => running -= 1,
            _ => {}
        }
    }
    assert!(peak <= 3, "observed {peak} concurrent agents");
    assert_eq!(running, 0);
}

#[tokio::test]
async fn test_serialized_execution_with_limit_one() {
    let (_tmp, repo) = init_repo();
    let (_manager, pool) = shell_pool(&repo, 1).await;
    let mut rx = pool.subscribe();

    let tasks: Vec<Task> = (0..3)
        .map(|i| Task::new(format!("t{i}"), "quick", "true"))
        .collect();
    let report = pool.run(tasks).await.expect("run");
    assert!(report.all_succeeded());

    let events = drain(&mut rx);
    let mut running = 0i64;
    for event in &events {
        match event.kind {
            EventKind::AgentSpawn => {
                running += 1;
                assert!(running <= 1, "N=1 must fully serialize");
            }
            EventKind::AgentComplete => running -= 1,
            _ => {}
        }
    }
}

#[tokio::test]
async fn test_cycle_rejection_spawns_no_agents() {
    let (_tmp, repo) = init_repo();
    let (manager, pool) = shell_pool(&repo, 4).await;

    let tasks = vec![
        Task::new("x", "X", "true").with_dependencies([TaskId::new("y")]),
        Task::new("y", "Y", "true").with_dependencies([TaskId::new("x")]),
    ];

    let result = pool.run_staged(tasks).await;
    match result {
        Err(Error::Core(CoreError::CycleDetected { cycles })) => {
            assert_eq!(cycles.len(), 1);
            assert_eq!(cycles[0], vec!["x".to_string(), "y".to_string()]);
        }
        other => panic!("expected cycle rejection, got {other:?}"),
    }

    assert!(manager.list().await.is_empty());
    assert!(pool.results().await.is_empty());
}

#[tokio::test]
async fn test_agent_output_is_captured_and_emitted() {
    let (_tmp, repo) = init_repo();
    let (_manager, pool) = shell_pool(&repo, 2).await;
    let mut rx = pool.subscribe();

    let report = pool
        .run(vec![Task::new("echoer", "Echoer", "echo hello-from-agent")])
        .await
        .expect("run");

    let outcome = report
        .results
        .get(&TaskId::new("echoer"))
        .expect("outcome recorded");
    assert!(outcome.success);
    assert_eq!(outcome.state, AgentState::Completed);
    assert_eq!(outcome.exit_code, Some(0));
    assert!(outcome.output.contains("hello-from-agent"));

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| e.kind == EventKind::AgentOutput && e.message.contains("hello-from-agent")));
}

#[tokio::test]
async fn test_failing_task_aborts_later_stages() {
    let (_tmp, repo) = init_repo();
    let (_manager, pool) = shell_pool(&repo, 4).await;

    let tasks = vec![
        Task::new("broken", "Broken", "exit 7"),
        Task::new("after", "After", "true").with_dependencies([TaskId::new("broken")]),
    ];

    let report = pool.run_staged(tasks).await.expect("run");
    assert!(report.aborted);
    assert_eq!(report.stages_completed, 1);

    let broken = report
        .results
        .get(&TaskId::new("broken"))
        .expect("failed outcome recorded");
    assert!(!broken.success);
    assert_eq!(broken.state, AgentState::Failed);
    assert_eq!(broken.exit_code, Some(7));
    assert!(!report.results.contains_key(&TaskId::new("after")));
}

#[tokio::test]
async fn test_kill_all_terminates_live_agents() {
    let (_tmp, repo) = init_repo();
    let (_manager, pool) = shell_pool(&repo, 2).await;
    let pool = Arc::new(pool);

    let runner = {
        let pool = pool.clone();
        tokio::spawn(async move {
            pool.run(vec![Task::new("sleeper", "Sleeper", "sleep 30")])
                .await
        })
    };

    // Give the agent time to spawn, then kill everything.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    pool.kill_all().await;

    let report = tokio::time::timeout(std::time::Duration::from_secs(10), runner)
        .await
        .expect("kill_all must unblock the run")
        .expect("join")
        .expect("run");

    let outcome = report
        .results
        .get(&TaskId::new("sleeper"))
        .expect("outcome recorded");
    assert!(!outcome.success);
    assert_eq!(outcome.state, AgentState::Failed);
    assert!(pool.live_agents().await.is_empty());
}
