//! The QA loop: check, auto-fix, AI-fix, verify, bounded iteration.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use momentum_core::qa::{
    apply_edit, build_fix_prompt, classify_failure, context_window, extract_error_details,
    CheckCommand, CheckDescriptor, CheckKind, CheckResult, FixAction, FixAttempt, FixPlan,
    FixStrategy, QaResult,
};

use crate::config::QaConfig;
use crate::error::{Error, Result};

/// The injected AI capability for fix planning.
#[async_trait]
pub trait FixPlanner: Send + Sync {
    /// Produce a fix plan for the given prompt.
    async fn plan_fix(&self, prompt: &str) -> Result<FixPlan>;
}

/// Aggregated fix statistics for one strategy label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyStats {
    /// Attempts made.
    pub attempts: u64,
    /// Attempts whose targeted check passed afterwards.
    pub successes: u64,
    /// Attempts that did not fix the check.
    pub failures: u64,
    /// Total wall time across attempts, milliseconds.
    pub total_duration_ms: u64,
}

/// Aggregate fix attempts per `(strategy, check)` label, e.g.
/// `"auto/lint"` or `"ai:import-fix/test"`.
#[must_use]
pub fn fix_stats(attempts: &[FixAttempt]) -> BTreeMap<String, StrategyStats> {
    let mut stats: BTreeMap<String, StrategyStats> = BTreeMap::new();
    for attempt in attempts {
        let entry = stats
            .entry(format!("{}/{}", attempt.strategy, attempt.check))
            .or_default();
        entry.attempts += 1;
        if attempt.success {
            entry.successes += 1;
        } else {
            entry.failures += 1;
        }
        entry.total_duration_ms += attempt.duration_ms;
    }
    stats
}

/// Runs the closed-loop checker over one worktree.
pub struct QaRunner {
    config: QaConfig,
    planner: Option<Arc<dyn FixPlanner>>,
}

impl QaRunner {
    /// Create a runner. Without a planner, escalation past the tools' own
    /// fix commands is unavailable.
    #[must_use]
    pub fn new(config: QaConfig, planner: Option<Arc<dyn FixPlanner>>) -> Self {
        Self { config, planner }
    }

    /// Bring the worktree to a clean state or report why that failed.
    pub async fn run(&self, worktree: &Path, max_iterations: u32) -> Result<QaResult> {
        let mut fix_attempts: Vec<FixAttempt> = Vec::new();
        let mut last_checks: Vec<CheckResult> = Vec::new();

        for iteration in 1..=max_iterations.max(1) {
            let checks = self.run_all_checks(worktree).await?;
            let failures: Vec<CheckResult> =
                checks.iter().filter(|check| !check.passed).cloned().collect();

            if failures.is_empty() {
                return Ok(QaResult {
                    passed: true,
                    checks,
                    iterations: iteration,
                    fix_attempts,
                    failure_reason: None,
                });
            }

            let (fixable, unfixable): (Vec<CheckResult>, Vec<CheckResult>) =
                failures.into_iter().partition(|check| check.fixable);

            if fixable.is_empty() {
                let failing: Vec<String> =
                    unfixable.iter().map(|check| check.kind.to_string()).collect();
                return Ok(QaResult {
                    passed: false,
                    checks,
                    iterations: iteration,
                    fix_attempts,
                    failure_reason: Some(format!("unfixable checks: {}", failing.join(", "))),
                });
            }

            let mut fixed_this_round = 0usize;
            for failure in &fixable {
                if self
                    .attempt_fixes(worktree, failure, &mut fix_attempts)
                    .await?
                {
                    fixed_this_round += 1;
                }
            }
            last_checks = checks;

            if fixed_this_round == 0 {
                return Ok(QaResult {
                    passed: false,
                    checks: last_checks,
                    iterations: iteration,
                    fix_attempts,
                    failure_reason: Some("no progress".to_string()),
                });
            }
        }

        Ok(QaResult {
            passed: false,
            checks: last_checks,
            iterations: max_iterations.max(1),
            fix_attempts,
            failure_reason: Some("max_iterations".to_string()),
        })
    }

    /// Try the simple auto-fix, then AI escalation, for one failure.
    /// Returns whether the targeted check passes afterwards.
    async fn attempt_fixes(
        &self,
        worktree: &Path,
        failure: &CheckResult,
        fix_attempts: &mut Vec<FixAttempt>,
    ) -> Result<bool> {
        let Some(descriptor) = self.descriptor_for(failure.kind) else {
            return Ok(false);
        };

        if let Some(fix_command) = failure.fix_command.as_ref() {
            let started = std::time::Instant::now();
            let mut success = false;
            if run_command(worktree, fix_command).await?.0 {
                success = self.run_check(worktree, descriptor).await?.passed;
            }
            fix_attempts.push(FixAttempt {
                strategy: FixStrategy::Auto,
                check: failure.kind,
                success,
                duration_ms: elapsed_ms(started),
            });
            if success {
                return Ok(true);
            }
        }

        let Some(planner) = self.planner.as_ref() else {
            return Ok(false);
        };

        let strategy = classify_failure(failure.kind, &failure.output);
        let started = std::time::Instant::now();
        let success = self
            .ai_fix(worktree, descriptor, failure, planner.as_ref())
            .await?;
        fix_attempts.push(FixAttempt {
            strategy: FixStrategy::Ai(strategy),
            check: failure.kind,
            success,
            duration_ms: elapsed_ms(started),
        });
        Ok(success)
    }

    async fn ai_fix(
        &self,
        worktree: &Path,
        descriptor: &CheckDescriptor,
        failure: &CheckResult,
        planner: &dyn FixPlanner,
    ) -> Result<bool> {
        let strategy = classify_failure(failure.kind, &failure.output);
        let details = extract_error_details(&failure.output, self.config.error_detail_limit);

        // ±N-line context windows around each reported location.
        let mut snippets: Vec<(String, Vec<String>)> = Vec::new();
        for detail in &details {
            let (Some(file), Some(line)) = (&detail.file, detail.line) else {
                continue;
            };
            let Ok(content) = tokio::fs::read_to_string(worktree.join(file)).await else {
                continue;
            };
            snippets.push((
                file.clone(),
                context_window(&content, line, self.config.context_radius),
            ));
        }

        let dependencies = dependency_snapshot(worktree).await;
        let prompt = build_fix_prompt(
            strategy,
            failure.kind,
            &failure.output,
            &details,
            &snippets,
            &dependencies,
        );

        let plan = planner.plan_fix(&prompt).await?;
        tracing::debug!(
            "applying fix plan '{}' with {} action(s)",
            plan.description,
            plan.actions.len()
        );
        if !self.apply_plan(worktree, &plan).await? {
            return Ok(false);
        }

        Ok(self.run_check(worktree, descriptor).await?.passed)
    }

    /// Apply a fix plan's actions in order. Returns false when an action
    /// fails (missing edit needle, failing command), leaving earlier
    /// actions in place.
    async fn apply_plan(&self, worktree: &Path, plan: &FixPlan) -> Result<bool> {
        for action in &plan.actions {
            match action {
                FixAction::Edit {
                    file,
                    search,
                    replace,
                } => {
                    let path = worktree.join(file);
                    let content = tokio::fs::read_to_string(&path).await?;
                    match apply_edit(&content, search, replace) {
                        Ok(updated) => tokio::fs::write(&path, updated).await?,
                        Err(e) => {
                            tracing::warn!("edit action failed for '{file}': {e}");
                            return Ok(false);
                        }
                    }
                }
                FixAction::Create { file, content } => {
                    let path = worktree.join(file);
                    if let Some(parent) = path.parent() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                    tokio::fs::write(&path, content).await?;
                }
                FixAction::Delete { file } => {
                    tokio::fs::remove_file(worktree.join(file)).await?;
                }
                FixAction::Command { program, args } => {
                    let command = CheckCommand::new(program.clone(), args.iter().cloned());
                    if !run_command(worktree, &command).await?.0 {
                        tracing::warn!("command action '{command}' failed");
                        return Ok(false);
                    }
                }
            }
        }
        Ok(true)
    }

    fn descriptor_for(&self, kind: CheckKind) -> Option<&CheckDescriptor> {
        self.config.checks.iter().find(|check| check.kind == kind)
    }

    /// Run every check kind once, configured or not.
    async fn run_all_checks(&self, worktree: &Path) -> Result<Vec<CheckResult>> {
        let mut results = Vec::new();
        for kind in CheckKind::all() {
            let result = match self.descriptor_for(kind) {
                Some(descriptor) => self.run_check(worktree, descriptor).await?,
                None => CheckResult::skipped(kind),
            };
            results.push(result);
        }
        Ok(results)
    }

    async fn run_check(&self, worktree: &Path, descriptor: &CheckDescriptor) -> Result<CheckResult> {
        let Some(command) = descriptor.command.as_ref() else {
            return Ok(CheckResult::skipped(descriptor.kind));
        };

        if which::which(&command.program).is_err() {
            return Ok(CheckResult {
                kind: descriptor.kind,
                passed: true,
                output: format!(
                    "{} tool '{}' not available; check skipped",
                    descriptor.kind, command.program
                ),
                fixable: false,
                fix_command: None,
            });
        }

        let (passed, output) = run_command(worktree, command).await?;
        let fixable = !passed && descriptor.is_auto_fixable(&output);
        Ok(CheckResult {
            kind: descriptor.kind,
            passed,
            output,
            fixable,
            fix_command: if fixable {
                descriptor.fix_command.clone()
            } else {
                None
            },
        })
    }
}

/// Run a command in the worktree; returns (success, combined output).
async fn run_command(worktree: &Path, command: &CheckCommand) -> Result<(bool, String)> {
    let output = tokio::process::Command::new(&command.program)
        .args(&command.args)
        .current_dir(worktree)
        .output()
        .await
        .map_err(|e| Error::Spawn {
            operation: command.to_string(),
            source: e,
        })?;
    let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok((output.status.success(), combined))
}

/// A dependency snapshot from the worktree's manifest, best effort.
async fn dependency_snapshot(worktree: &Path) -> Vec<String> {
    if let Ok(content) = tokio::fs::read_to_string(worktree.join("package.json")).await {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&content) {
            let mut deps: Vec<String> = value
                .get("dependencies")
                .and_then(|d| d.as_object())
                .map(|d| d.keys().cloned().collect())
                .unwrap_or_default();
            deps.sort();
            return deps;
        }
    }
    if let Ok(content) = tokio::fs::read_to_string(worktree.join("Cargo.toml")).await {
        let mut deps = Vec::new();
        let mut in_dependencies = false;
        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with('[') {
                in_dependencies = trimmed == "[dependencies]";
                continue;
            }
            if in_dependencies {
                if let Some((name, _)) = trimmed.split_once('=') {
                    deps.push(name.trim().to_string());
                }
            }
        }
        return deps;
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use momentum_core::qa::FixStrategyKind;

    #[test]
    fn test_fix_stats_aggregation() {
        let attempts = vec![
            FixAttempt {
                strategy: FixStrategy::Auto,
                check: CheckKind::Lint,
                success: true,
                duration_ms: 10,
            },
            FixAttempt {
                strategy: FixStrategy::Auto,
                check: CheckKind::Lint,
                success: false,
                duration_ms: 5,
            },
            FixAttempt {
                strategy: FixStrategy::Ai(FixStrategyKind::Import),
                check: CheckKind::Test,
                success: true,
                duration_ms: 100,
            },
        ];
        let stats = fix_stats(&attempts);
        let auto = stats
            .get("auto/lint")
            .unwrap_or_else(|| panic!("missing auto/lint"));
        assert_eq!(auto.attempts, 2);
        assert_eq!(auto.successes, 1);
        assert_eq!(auto.total_duration_ms, 15);
        assert!(stats.contains_key("ai:import-fix/test"));
    }
}

fn elapsed_ms(started: std::time::Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
