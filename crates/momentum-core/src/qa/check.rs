//! Check kinds, invocation descriptors and results.

use serde::{Deserialize, Serialize};

use super::fix::FixStrategyKind;

/// The four quality gates.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CheckKind {
    /// Style/lint check.
    Lint,
    /// Static type check.
    Typecheck,
    /// Test suite.
    Test,
    /// Build/compile.
    Build,
}

impl CheckKind {
    /// All check kinds in execution order.
    #[must_use]
    pub const fn all() -> [Self; 4] {
        [Self::Lint, Self::Typecheck, Self::Test, Self::Build]
    }
}

/// An invocation: program plus arguments, run in the worktree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckCommand {
    /// Program name, resolved on PATH.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
}

impl CheckCommand {
    /// Create a new command.
    #[must_use]
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = String>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().collect(),
        }
    }
}

impl std::fmt::Display for CheckCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// How to run one check: command, auto-fix command, and the output
/// signatures that mark a failure as auto-fixable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckDescriptor {
    /// Which gate this configures.
    pub kind: CheckKind,
    /// The check command; `None` means the check is not configured.
    pub command: Option<CheckCommand>,
    /// The simple auto-fix command, if the tool has one.
    pub fix_command: Option<CheckCommand>,
    /// Case-insensitive substrings of check output that imply the failure
    /// is auto-fixable.
    pub fixable_signatures: Vec<String>,
}

impl CheckDescriptor {
    /// A descriptor for an unconfigured check.
    #[must_use]
    pub fn unconfigured(kind: CheckKind) -> Self {
        Self {
            kind,
            command: None,
            fix_command: None,
            fixable_signatures: default_signatures(kind),
        }
    }

    /// Set the check command.
    #[must_use]
    pub fn with_command(mut self, command: CheckCommand) -> Self {
        self.command = Some(command);
        self
    }

    /// Set the auto-fix command.
    #[must_use]
    pub fn with_fix_command(mut self, command: CheckCommand) -> Self {
        self.fix_command = Some(command);
        self
    }

    /// True when the output carries one of the auto-fixable signatures and
    /// a fix command is configured.
    #[must_use]
    pub fn is_auto_fixable(&self, output: &str) -> bool {
        if self.fix_command.is_none() {
            return false;
        }
        let lower = output.to_lowercase();
        self.fixable_signatures
            .iter()
            .any(|sig| lower.contains(&sig.to_lowercase()))
    }
}

fn default_signatures(kind: CheckKind) -> Vec<String> {
    match kind {
        CheckKind::Lint => vec![
            "--fix".to_string(),
            "fixable".to_string(),
            "auto-fix".to_string(),
        ],
        CheckKind::Typecheck | CheckKind::Test | CheckKind::Build => Vec::new(),
    }
}

/// Outcome of one check run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Which gate ran.
    pub kind: CheckKind,
    /// Whether the check passed.
    pub passed: bool,
    /// Raw combined output.
    pub output: String,
    /// Whether the failure looked auto-fixable.
    pub fixable: bool,
    /// The fix command, when fixable.
    pub fix_command: Option<CheckCommand>,
}

impl CheckResult {
    /// Result for a check that is not configured: passes, with a note.
    #[must_use]
    pub fn skipped(kind: CheckKind) -> Self {
        Self {
            kind,
            passed: true,
            output: format!("{kind} check not configured; skipped"),
            fixable: false,
            fix_command: None,
        }
    }
}

/// Which mechanism attempted a fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixStrategy {
    /// The check tool's own fix command.
    Auto,
    /// An AI-generated fix plan.
    Ai(FixStrategyKind),
}

impl std::fmt::Display for FixStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Ai(kind) => write!(f, "ai:{kind}"),
        }
    }
}

/// One fix attempt in the QA loop history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixAttempt {
    /// Auto or AI, and which AI strategy.
    pub strategy: FixStrategy,
    /// Which check the fix targeted.
    pub check: CheckKind,
    /// Whether the targeted check passed after the fix.
    pub success: bool,
    /// Wall time of the attempt in milliseconds.
    pub duration_ms: u64,
}

/// Result of a full QA loop over one worktree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaResult {
    /// Whether every configured check passed.
    pub passed: bool,
    /// Final per-check records.
    pub checks: Vec<CheckResult>,
    /// Iterations consumed.
    pub iterations: u32,
    /// Every fix attempt, in order.
    pub fix_attempts: Vec<FixAttempt>,
    /// Why the loop gave up, when it did.
    pub failure_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skipped_check_passes_with_note() {
        let result = CheckResult::skipped(CheckKind::Typecheck);
        assert!(result.passed);
        assert!(result.output.contains("not configured"));
    }

    #[test]
    fn test_auto_fixable_requires_signature_and_fix_command() {
        let descriptor = CheckDescriptor::unconfigured(CheckKind::Lint)
            .with_command(CheckCommand::new("eslint", ["src".to_string()]))
            .with_fix_command(CheckCommand::new(
                "eslint",
                ["src".to_string(), "--fix".to_string()],
            ));
        assert!(descriptor.is_auto_fixable("2 problems potentially fixable with --fix"));
        assert!(!descriptor.is_auto_fixable("2 problems"));

        let no_fix = CheckDescriptor::unconfigured(CheckKind::Lint)
            .with_command(CheckCommand::new("eslint", ["src".to_string()]));
        assert!(!no_fix.is_auto_fixable("fixable with --fix"));
    }

    #[test]
    fn test_check_command_display() {
        let cmd = CheckCommand::new("cargo", ["clippy".to_string(), "--fix".to_string()]);
        assert_eq!(cmd.to_string(), "cargo clippy --fix");
    }
}
