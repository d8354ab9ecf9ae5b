//! Resolution validation.
//!
//! Every AI-produced resolution passes through five checks before it is
//! allowed to touch the working tree: non-blank, marker-free, basic syntax
//! for the file's language, a length bound relative to the conflict size,
//! and preservation of at least one identifier from the "ours" side.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::conflict::{contains_conflict_markers, ConflictHunk};

/// Confidence reported by the resolution provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// The provider is confident in the resolution.
    High,
    /// Reasonable but worth a glance.
    #[default]
    Medium,
    /// Needs review.
    Low,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// An AI-produced resolution for one conflicted file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// The resolved file content; must carry no conflict markers.
    pub content: String,
    /// Brief explanation of the resolution.
    pub explanation: String,
    /// Confidence tag.
    #[serde(default)]
    pub confidence: Confidence,
}

/// Which validation rule rejected a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ValidationRule {
    /// Resolution was empty or whitespace.
    NonEmpty,
    /// Resolution still contained conflict markers.
    NoMarkers,
    /// Resolution failed the basic syntax check.
    Syntax,
    /// Resolution exceeded the length bound.
    LengthBound,
    /// Resolution dropped every identifier from the "ours" side.
    IdentifierPreservation,
}

/// A rejected resolution, with retry guidance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// The rule that fired.
    pub rule: ValidationRule,
    /// Human-readable rejection, fed back into the retry prompt.
    pub message: String,
    /// Whether re-prompting with the error appended may help.
    pub retryable: bool,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.rule, self.message)
    }
}

/// Language inferred from a file path, for syntax checks and prompt tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Rust,
    JavaScript,
    TypeScript,
    Python,
    Go,
    Java,
    C,
    Cpp,
    Ruby,
    Json,
    Yaml,
    Toml,
    Shell,
    Markdown,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyntaxFamily {
    Curly,
    Indent,
    Json,
    Opaque,
}

impl Language {
    /// Infer the language from a path's extension.
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        match ext {
            "rs" => Self::Rust,
            "js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
            "ts" | "tsx" => Self::TypeScript,
            "py" => Self::Python,
            "go" => Self::Go,
            "java" => Self::Java,
            "c" | "h" => Self::C,
            "cc" | "cpp" | "hpp" | "cxx" => Self::Cpp,
            "rb" => Self::Ruby,
            "json" => Self::Json,
            "yml" | "yaml" => Self::Yaml,
            "toml" => Self::Toml,
            "sh" | "bash" => Self::Shell,
            "md" | "markdown" => Self::Markdown,
            _ => Self::Unknown,
        }
    }

    /// Language tag used in prompts.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Python => "python",
            Self::Go => "go",
            Self::Java => "java",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::Ruby => "ruby",
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Toml => "toml",
            Self::Shell => "shell",
            Self::Markdown => "markdown",
            Self::Unknown => "text",
        }
    }

    const fn family(self) -> SyntaxFamily {
        match self {
            Self::Rust
            | Self::JavaScript
            | Self::TypeScript
            | Self::Go
            | Self::Java
            | Self::C
            | Self::Cpp => SyntaxFamily::Curly,
            Self::Python | Self::Yaml => SyntaxFamily::Indent,
            Self::Json => SyntaxFamily::Json,
            Self::Ruby | Self::Toml | Self::Shell | Self::Markdown | Self::Unknown => {
                SyntaxFamily::Opaque
            }
        }
    }
}

#[allow(clippy::expect_used)] // pattern is a compile-time constant
fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]{2,}").expect("static identifier pattern"))
}

const IDENTIFIER_BLACKLIST: &[&str] = &[
    "let", "const", "var", "function", "return", "else", "for", "while", "new", "this", "true",
    "false", "null", "undefined", "pub", "use", "mut", "async", "await", "import", "from", "def",
    "self", "None", "True", "False", "class", "interface", "struct", "enum", "type", "match",
    "impl", "static", "export", "require",
];

fn identifiers(text: &str) -> BTreeSet<String> {
    identifier_re()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .filter(|ident| !IDENTIFIER_BLACKLIST.contains(&ident.as_str()))
        .collect()
}

/// Check brace/paren/bracket balance, skipping string and char literals.
fn balanced_delimiters(content: &str) -> bool {
    let mut stack: Vec<char> = Vec::new();
    let mut chars = content.chars().peekable();
    let mut in_string: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(quote) = in_string {
            if c == '\\' {
                let _ = chars.next();
            } else if c == quote {
                in_string = None;
            }
            continue;
        }
        match c {
            '"' | '\'' | '`' => in_string = Some(c),
            '{' | '(' | '[' => stack.push(c),
            '}' => {
                if stack.pop() != Some('{') {
                    return false;
                }
            }
            ')' => {
                if stack.pop() != Some('(') {
                    return false;
                }
            }
            ']' => {
                if stack.pop() != Some('[') {
                    return false;
                }
            }
            _ => {}
        }
    }
    stack.is_empty()
}

/// Leading whitespace must be uniform: no tab after a space in the indent.
fn sane_indentation(content: &str) -> bool {
    for line in content.lines() {
        let indent: String = line.chars().take_while(|c| c.is_whitespace()).collect();
        if indent.contains(' ') && indent.trim_start_matches(' ').contains('\t') {
            return false;
        }
    }
    true
}

fn syntax_ok(content: &str, language: Language) -> bool {
    match language.family() {
        SyntaxFamily::Curly => balanced_delimiters(content),
        SyntaxFamily::Indent => sane_indentation(content),
        SyntaxFamily::Json => serde_json::from_str::<serde_json::Value>(content).is_ok(),
        SyntaxFamily::Opaque => true,
    }
}

/// Validate a resolution against the hunks it claims to resolve.
///
/// # Errors
///
/// Returns the first [`ValidationError`] whose rule rejects the content.
pub fn validate_resolution(
    content: &str,
    hunks: &[ConflictHunk],
    language: Language,
) -> std::result::Result<(), ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError {
            rule: ValidationRule::NonEmpty,
            message: "resolution is empty or whitespace-only".to_string(),
            retryable: true,
        });
    }

    if contains_conflict_markers(content) {
        return Err(ValidationError {
            rule: ValidationRule::NoMarkers,
            message: "resolution still contains conflict markers".to_string(),
            retryable: true,
        });
    }

    if !syntax_ok(content, language) {
        return Err(ValidationError {
            rule: ValidationRule::Syntax,
            message: format!("resolution fails the basic {} syntax check", language.tag()),
            retryable: true,
        });
    }

    let estimate: usize = hunks.iter().map(ConflictHunk::larger_side).sum::<usize>().max(1);
    let allowed = estimate.saturating_mul(3);
    let actual = content.lines().count();
    if actual > allowed {
        return Err(ValidationError {
            rule: ValidationRule::LengthBound,
            message: format!(
                "resolution is {actual} lines, more than 3x the conflict estimate of {estimate}"
            ),
            retryable: true,
        });
    }

    let ours_text: String = hunks
        .iter()
        .flat_map(|h| h.ours.iter())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n");
    let ours_idents = identifiers(&ours_text);
    if !ours_idents.is_empty() {
        let resolved_idents = identifiers(content);
        if ours_idents.is_disjoint(&resolved_idents) {
            return Err(ValidationError {
                rule: ValidationRule::IdentifierPreservation,
                message: "resolution preserves no identifier from the current branch".to_string(),
                retryable: true,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hunk(ours: &[&str], theirs: &[&str]) -> ConflictHunk {
        ConflictHunk {
            ours: ours.iter().map(ToString::to_string).collect(),
            theirs: theirs.iter().map(ToString::to_string).collect(),
            ours_label: None,
            theirs_label: None,
            context_before: Vec::new(),
            context_after: Vec::new(),
        }
    }

    #[test]
    fn test_valid_resolution_passes() {
        let hunks = [hunk(&["let total_count = 1;"], &["let total_count = 2;"])];
        let result = validate_resolution("let total_count = 2;", &hunks, Language::Rust);
        assert!(result.is_ok());
    }

    #[test]
    fn test_empty_resolution_rejected() {
        let hunks = [hunk(&["a"], &["b"])];
        let err = validate_resolution("   \n  ", &hunks, Language::Rust);
        assert_eq!(err.map_err(|e| e.rule), Err(ValidationRule::NonEmpty));
    }

    #[test]
    fn test_markers_rejected_with_message() {
        let hunks = [hunk(&["let value_x = 1;"], &["let value_x = 2;"])];
        let err = validate_resolution("<<<<<<< HEAD\nlet value_x = 1;", &hunks, Language::Rust);
        match err {
            Err(e) => {
                assert_eq!(e.rule, ValidationRule::NoMarkers);
                assert!(e.message.contains("conflict markers"));
                assert!(e.retryable);
            }
            Ok(()) => panic!("expected marker rejection"),
        }
    }

    #[test]
    fn test_unbalanced_braces_rejected() {
        let hunks = [hunk(&["fn run_once() {"], &["fn run_once() { }"])];
        let err = validate_resolution("fn run_once() { {", &hunks, Language::Rust);
        assert_eq!(err.map_err(|e| e.rule), Err(ValidationRule::Syntax));
    }

    #[test]
    fn test_braces_inside_strings_ignored() {
        let hunks = [hunk(&["let brace_str = \"x\";"], &["let brace_str = \"y\";"])];
        let result =
            validate_resolution("let brace_str = \"{ not a brace\";", &hunks, Language::Rust);
        assert!(result.is_ok());
    }

    #[test]
    fn test_invalid_json_rejected() {
        let hunks = [hunk(&["{\"version_tag\": 1}"], &["{\"version_tag\": 2}"])];
        let err = validate_resolution("{\"version_tag\": }", &hunks, Language::Json);
        assert_eq!(err.map_err(|e| e.rule), Err(ValidationRule::Syntax));
    }

    #[test]
    fn test_length_bound_rejected() {
        let hunks = [hunk(&["short_line"], &["short_line2"])];
        let bloated = (0..10)
            .map(|i| format!("short_line {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let err = validate_resolution(&bloated, &hunks, Language::Unknown);
        assert_eq!(err.map_err(|e| e.rule), Err(ValidationRule::LengthBound));
    }

    #[test]
    fn test_identifier_preservation_rejected() {
        let hunks = [hunk(&["let payment_total = 1;"], &["let other = 2;"])];
        let err = validate_resolution("let unrelated = 9;", &hunks, Language::Rust);
        assert_eq!(
            err.map_err(|e| e.rule),
            Err(ValidationRule::IdentifierPreservation)
        );
    }

    #[test]
    fn test_language_inference() {
        assert_eq!(Language::from_path("src/main.rs"), Language::Rust);
        assert_eq!(Language::from_path("lib/app.ts"), Language::TypeScript);
        assert_eq!(Language::from_path("config.json"), Language::Json);
        assert_eq!(Language::from_path("README"), Language::Unknown);
    }
}
