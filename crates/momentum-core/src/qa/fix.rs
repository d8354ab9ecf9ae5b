//! AI fix strategies: failure classification, error-detail extraction and
//! fix plans.
//!
//! A fix plan is what the injected fix provider returns: a JSON document
//! describing edit/create/delete/command actions. Edits are literal
//! search/replace; a missing needle is a reported failure, never a silent
//! no-op.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::check::CheckKind;
use crate::error::{Error, Result};

/// The category of an AI-produced corrective action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixStrategyKind {
    /// Missing or wrong imports.
    Import,
    /// Parse-level breakage.
    Syntax,
    /// Type errors.
    Type,
    /// Failing tests.
    Test,
    /// Lint violations that resisted the tool's own fixer.
    Lint,
}

impl std::fmt::Display for FixStrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Import => write!(f, "import-fix"),
            Self::Syntax => write!(f, "syntax-fix"),
            Self::Type => write!(f, "type-fix"),
            Self::Test => write!(f, "test-fix"),
            Self::Lint => write!(f, "lint-fix"),
        }
    }
}

const IMPORT_SIGNATURES: &[&str] = &[
    "cannot find module",
    "unresolved import",
    "module not found",
    "no such file or directory",
    "is not defined",
];

const SYNTAX_SIGNATURES: &[&str] = &[
    "syntaxerror",
    "unexpected token",
    "expected one of",
    "unexpected end of",
    "parse error",
];

/// Classify a check failure into the fix strategy most likely to help.
/// Import and syntax signatures win over the check-kind default.
#[must_use]
pub fn classify_failure(kind: CheckKind, output: &str) -> FixStrategyKind {
    let lower = output.to_lowercase();
    if IMPORT_SIGNATURES.iter().any(|sig| lower.contains(sig)) {
        return FixStrategyKind::Import;
    }
    if SYNTAX_SIGNATURES.iter().any(|sig| lower.contains(sig)) {
        return FixStrategyKind::Syntax;
    }
    match kind {
        CheckKind::Typecheck => FixStrategyKind::Type,
        CheckKind::Test => FixStrategyKind::Test,
        CheckKind::Build => FixStrategyKind::Syntax,
        CheckKind::Lint => FixStrategyKind::Lint,
    }
}

/// A structured error location pulled out of tool output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// File path, when the line carried one.
    pub file: Option<String>,
    /// 1-indexed line number.
    pub line: Option<u32>,
    /// 1-indexed column number.
    pub column: Option<u32>,
    /// The raw diagnostic line.
    pub message: String,
}

#[allow(clippy::expect_used)] // pattern is a compile-time constant
fn location_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?P<file>[\w@./\\-]+\.[A-Za-z]{1,4}):(?P<line>\d+)(?::(?P<col>\d+))?")
            .expect("static location pattern")
    })
}

/// Extract file/line/column tuples from tool output, capped at `limit`.
#[must_use]
pub fn extract_error_details(output: &str, limit: usize) -> Vec<ErrorDetail> {
    let mut details = Vec::new();
    for line in output.lines() {
        if details.len() >= limit {
            break;
        }
        if let Some(caps) = location_re().captures(line) {
            details.push(ErrorDetail {
                file: caps.name("file").map(|m| m.as_str().to_string()),
                line: caps.name("line").and_then(|m| m.as_str().parse().ok()),
                column: caps.name("col").and_then(|m| m.as_str().parse().ok()),
                message: line.trim().to_string(),
            });
        }
    }
    details
}

/// The ±`radius` lines around a 1-indexed line of the given content.
#[must_use]
pub fn context_window(content: &str, line: u32, radius: usize) -> Vec<String> {
    let lines: Vec<&str> = content.lines().collect();
    let center = (line.max(1) as usize).saturating_sub(1);
    let start = center.saturating_sub(radius);
    let end = center.saturating_add(radius).saturating_add(1).min(lines.len());
    if start >= lines.len() {
        return Vec::new();
    }
    lines[start..end].iter().map(ToString::to_string).collect()
}

/// One action in a fix plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FixAction {
    /// Literal search/replace in an existing file.
    Edit {
        /// Worktree-relative path.
        file: String,
        /// Exact text to find.
        search: String,
        /// Replacement text.
        replace: String,
    },
    /// Create a file with the given content.
    Create {
        /// Worktree-relative path.
        file: String,
        /// File content.
        content: String,
    },
    /// Delete a file.
    Delete {
        /// Worktree-relative path.
        file: String,
    },
    /// Run a command in the worktree.
    Command {
        /// Program name.
        program: String,
        /// Arguments.
        #[serde(default)]
        args: Vec<String>,
    },
}

/// A fix description returned by the fix provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixPlan {
    /// What the plan is trying to do.
    pub description: String,
    /// Actions to apply in order.
    pub actions: Vec<FixAction>,
}

impl FixPlan {
    /// Parse a provider response, tolerating markdown code fences.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` when the response is not a fix-plan
    /// JSON document.
    pub fn parse(response: &str) -> Result<Self> {
        let trimmed = response.trim();
        let body = trimmed
            .strip_prefix("```json")
            .or_else(|| trimmed.strip_prefix("```"))
            .map_or(trimmed, |rest| rest.trim_end_matches("```"));
        serde_json::from_str(body.trim())
            .map_err(|e| Error::Validation(format!("fix plan is not valid JSON: {e}")))
    }
}

/// Apply a literal search/replace to file content.
///
/// # Errors
///
/// Returns `Error::Validation` when the search string is absent.
pub fn apply_edit(content: &str, search: &str, replace: &str) -> Result<String> {
    if !content.contains(search) {
        return Err(Error::Validation(
            "edit search string not found in file".to_string(),
        ));
    }
    Ok(content.replacen(search, replace, 1))
}

/// Build the prompt for an AI fix attempt.
#[must_use]
pub fn build_fix_prompt(
    strategy: FixStrategyKind,
    check: CheckKind,
    output: &str,
    details: &[ErrorDetail],
    snippets: &[(String, Vec<String>)],
    dependencies: &[String],
) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "A {check} check failed; apply a {strategy} to make it pass.\n\n"
    ));

    let objective = match strategy {
        FixStrategyKind::Import => "Correct the imports: add missing ones, remove or rename broken ones.",
        FixStrategyKind::Syntax => "Repair the syntax error without changing behavior.",
        FixStrategyKind::Type => "Fix the type error; adjust annotations or call sites, not semantics.",
        FixStrategyKind::Test => "Make the failing test pass by fixing the code under test.",
        FixStrategyKind::Lint => "Resolve the lint violation in the style the surrounding code uses.",
    };
    prompt.push_str(objective);
    prompt.push_str("\n\nCheck output:\n```\n");
    prompt.push_str(output.trim());
    prompt.push_str("\n```\n");

    if !details.is_empty() {
        prompt.push_str("\nError locations:\n");
        for detail in details {
            prompt.push_str(&format!(
                "- {}:{}:{}\n",
                detail.file.as_deref().unwrap_or("?"),
                detail.line.unwrap_or(0),
                detail.column.unwrap_or(0),
            ));
        }
    }

    for (file, lines) in snippets {
        prompt.push_str(&format!("\nContext from `{file}`:\n```\n"));
        for line in lines {
            prompt.push_str(line);
            prompt.push('\n');
        }
        prompt.push_str("```\n");
    }

    if !dependencies.is_empty() {
        prompt.push_str("\nDeclared dependencies:\n");
        for dep in dependencies {
            prompt.push_str(&format!("- {dep}\n"));
        }
    }

    prompt.push_str(
        "\nRespond with a JSON object: {\"description\": string, \"actions\": [\
         {\"action\": \"edit\", \"file\": string, \"search\": string, \"replace\": string} | \
         {\"action\": \"create\", \"file\": string, \"content\": string} | \
         {\"action\": \"delete\", \"file\": string} | \
         {\"action\": \"command\", \"program\": string, \"args\": [string]}]}\n\
         Edits must use exact literal text from the file.\n",
    );

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_order() {
        assert_eq!(
            classify_failure(CheckKind::Test, "Error: Cannot find module './util'"),
            FixStrategyKind::Import
        );
        assert_eq!(
            classify_failure(CheckKind::Lint, "SyntaxError: unexpected token"),
            FixStrategyKind::Syntax
        );
        assert_eq!(
            classify_failure(CheckKind::Typecheck, "mismatched types"),
            FixStrategyKind::Type
        );
        assert_eq!(
            classify_failure(CheckKind::Test, "assertion failed"),
            FixStrategyKind::Test
        );
        assert_eq!(
            classify_failure(CheckKind::Lint, "unused variable"),
            FixStrategyKind::Lint
        );
    }

    #[test]
    fn test_extract_error_details() {
        let output = "src/app.ts:14:7 - error TS2322\nsome noise\nlib/util.js:3";
        let details = extract_error_details(output, 10);
        assert_eq!(details.len(), 2);
        assert_eq!(details[0].file.as_deref(), Some("src/app.ts"));
        assert_eq!(details[0].line, Some(14));
        assert_eq!(details[0].column, Some(7));
        assert_eq!(details[1].line, Some(3));
        assert_eq!(details[1].column, None);
    }

    #[test]
    fn test_context_window_bounds() {
        let content = "a\nb\nc\nd\ne";
        assert_eq!(context_window(content, 1, 1), vec!["a", "b"]);
        assert_eq!(context_window(content, 3, 1), vec!["b", "c", "d"]);
        assert_eq!(context_window(content, 5, 2), vec!["c", "d", "e"]);
        assert!(context_window(content, 99, 2).is_empty());
    }

    #[test]
    fn test_fix_plan_parse_with_fences() {
        let response = "```json\n{\"description\": \"add import\", \"actions\": [{\"action\": \"edit\", \"file\": \"a.ts\", \"search\": \"old\", \"replace\": \"new\"}]}\n```";
        let plan = FixPlan::parse(response).unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert_eq!(plan.actions.len(), 1);
        assert!(matches!(plan.actions[0], FixAction::Edit { .. }));
    }

    #[test]
    fn test_fix_plan_parse_rejects_garbage() {
        assert!(FixPlan::parse("not json at all").is_err());
    }

    #[test]
    fn test_apply_edit_literal() {
        let out = apply_edit("let a = 1;\nlet b = 2;", "let b = 2;", "let b = 3;")
            .unwrap_or_else(|e| panic!("edit failed: {e}"));
        assert_eq!(out, "let a = 1;\nlet b = 3;");
        assert!(apply_edit("abc", "zzz", "y").is_err());
    }
}
