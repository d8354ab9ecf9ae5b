//! QA loop integration tests: self-heal via auto-fix, AI escalation,
//! unfixable failures, and progress guarding. Checks are shell one-liners
//! keyed on marker files, so every scenario is deterministic.

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

use momentum_core::qa::{
    CheckCommand, CheckDescriptor, CheckKind, FixAction, FixPlan, FixStrategy, FixStrategyKind,
};
use momentum_engine::{fix_stats, FixPlanner, QaConfig, QaRunner};

fn sh(script: &str) -> CheckCommand {
    CheckCommand::new("sh", ["-c".to_string(), script.to_string()])
}

/// A lint check that fails until `marker` exists, advertising the failure
/// as auto-fixable.
fn lint_until(marker: &str) -> CheckDescriptor {
    CheckDescriptor::unconfigured(CheckKind::Lint).with_command(sh(&format!(
        "test -f {marker} || {{ echo 'lint: 2 problems potentially fixable with --fix'; exit 1; }}"
    )))
}

fn qa_config(checks: Vec<CheckDescriptor>) -> QaConfig {
    QaConfig {
        checks,
        ..QaConfig::default()
    }
}

struct ScriptedPlanner {
    plan: FixPlan,
}

#[async_trait::async_trait]
impl FixPlanner for ScriptedPlanner {
    async fn plan_fix(&self, _prompt: &str) -> momentum_engine::Result<FixPlan> {
        Ok(self.plan.clone())
    }
}

#[tokio::test]
async fn test_unconfigured_checks_pass_with_note() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runner = QaRunner::new(qa_config(Vec::new()), None);

    let result = runner.run(dir.path(), 10).await.expect("run");
    assert!(result.passed);
    assert_eq!(result.iterations, 1);
    assert_eq!(result.checks.len(), 4);
    assert!(result
        .checks
        .iter()
        .all(|check| check.passed && check.output.contains("not configured")));
}

#[tokio::test]
async fn test_self_heal_via_auto_fix() {
    let dir = tempfile::tempdir().expect("tempdir");
    let lint = lint_until(".fixed").with_fix_command(sh("touch .fixed"));
    let runner = QaRunner::new(qa_config(vec![lint]), None);

    let result = runner.run(dir.path(), 10).await.expect("run");
    assert!(result.passed);
    assert_eq!(result.iterations, 2);
    assert!(result.failure_reason.is_none());

    assert_eq!(result.fix_attempts.len(), 1);
    let attempt = &result.fix_attempts[0];
    assert_eq!(attempt.strategy, FixStrategy::Auto);
    assert_eq!(attempt.check, CheckKind::Lint);
    assert!(attempt.success);

    let stats = fix_stats(&result.fix_attempts);
    let auto = stats.get("auto/lint").expect("auto/lint stats");
    assert_eq!(auto.attempts, 1);
    assert_eq!(auto.successes, 1);
}

#[tokio::test]
async fn test_unfixable_failure_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    // Fails with no auto-fixable signature and no fix command.
    let test_check = CheckDescriptor::unconfigured(CheckKind::Test)
        .with_command(sh("echo '1 test failed'; exit 1"));
    let runner = QaRunner::new(qa_config(vec![test_check]), None);

    let result = runner.run(dir.path(), 10).await.expect("run");
    assert!(!result.passed);
    assert_eq!(result.iterations, 1);
    let reason = result.failure_reason.expect("failure reason");
    assert!(reason.contains("unfixable"));
    assert!(reason.contains("test"));
    assert!(result.fix_attempts.is_empty());
}

#[tokio::test]
async fn test_ai_escalation_after_auto_fix_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let lint = lint_until(".ai_fixed").with_fix_command(sh("exit 1"));
    let planner = ScriptedPlanner {
        plan: FixPlan {
            description: "create the marker the lint wants".to_string(),
            actions: vec![FixAction::Create {
                file: ".ai_fixed".to_string(),
                content: String::new(),
            }],
        },
    };
    let runner = QaRunner::new(qa_config(vec![lint]), Some(std::sync::Arc::new(planner)));

    let result = runner.run(dir.path(), 10).await.expect("run");
    assert!(result.passed);
    assert_eq!(result.iterations, 2);

    assert_eq!(result.fix_attempts.len(), 2);
    assert_eq!(result.fix_attempts[0].strategy, FixStrategy::Auto);
    assert!(!result.fix_attempts[0].success);
    assert_eq!(
        result.fix_attempts[1].strategy,
        FixStrategy::Ai(FixStrategyKind::Lint)
    );
    assert!(result.fix_attempts[1].success);
}

#[tokio::test]
async fn test_edit_action_with_missing_needle_fails_the_attempt() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("app.txt"), "stable content\n").expect("write");

    let lint = lint_until(".never").with_fix_command(sh("exit 1"));
    let planner = ScriptedPlanner {
        plan: FixPlan {
            description: "edit text that is not there".to_string(),
            actions: vec![FixAction::Edit {
                file: "app.txt".to_string(),
                search: "no such needle".to_string(),
                replace: "anything".to_string(),
            }],
        },
    };
    let runner = QaRunner::new(qa_config(vec![lint]), Some(std::sync::Arc::new(planner)));

    let result = runner.run(dir.path(), 10).await.expect("run");
    assert!(!result.passed);
    assert_eq!(result.failure_reason.as_deref(), Some("no progress"));
    assert!(result
        .fix_attempts
        .iter()
        .all(|attempt| !attempt.success));
    // The failed edit left the file untouched.
    let content = std::fs::read_to_string(dir.path().join("app.txt")).expect("read");
    assert_eq!(content, "stable content\n");
}

#[tokio::test]
async fn test_no_progress_stops_the_loop() {
    let dir = tempfile::tempdir().expect("tempdir");
    // The fix command "succeeds" but never makes the check pass.
    let lint = lint_until(".never").with_fix_command(sh("true"));
    let runner = QaRunner::new(qa_config(vec![lint]), None);

    let result = runner.run(dir.path(), 10).await.expect("run");
    assert!(!result.passed);
    assert_eq!(result.iterations, 1);
    assert_eq!(result.failure_reason.as_deref(), Some("no progress"));
}

#[tokio::test]
async fn test_unavailable_tool_skips_the_check() {
    let dir = tempfile::tempdir().expect("tempdir");
    let lint = CheckDescriptor::unconfigured(CheckKind::Lint).with_command(CheckCommand::new(
        "momentum-no-such-linter",
        Vec::new(),
    ));
    let runner = QaRunner::new(qa_config(vec![lint]), None);

    let result = runner.run(dir.path(), 10).await.expect("run");
    assert!(result.passed);
    assert!(result
        .checks
        .iter()
        .any(|check| check.output.contains("not available")));
}
