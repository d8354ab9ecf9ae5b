//! Conflict categorization and difficulty scoring.
//!
//! Categories drive the merge tier choice: trivial conflicts are expected
//! to auto-resolve, complex ones get routed to AI with review or to the
//! manual queue.

use serde::{Deserialize, Serialize};

use crate::conflict::ConflictHunk;

/// How hard a conflict looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictCategory {
    /// Whitespace, import-only or comment-only differences.
    Trivial,
    /// Anything that is neither trivial nor complex.
    Moderate,
    /// Large or structurally significant differences.
    Complex,
}

impl ConflictCategory {
    /// Difficulty weight contributed by a hunk of this category.
    #[must_use]
    pub const fn weight(self) -> u32 {
        match self {
            Self::Trivial => 5,
            Self::Moderate => 15,
            Self::Complex => 30,
        }
    }
}

impl std::fmt::Display for ConflictCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trivial => write!(f, "trivial"),
            Self::Moderate => write!(f, "moderate"),
            Self::Complex => write!(f, "complex"),
        }
    }
}

/// Resolution recommendation derived from average difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// Average difficulty <= 20.
    AutoLikely,
    /// Average difficulty <= 50.
    AiRecommended,
    /// Average difficulty <= 70.
    AiWithReview,
    /// Anything harder.
    Manual,
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AutoLikely => write!(f, "auto-resolution likely successful"),
            Self::AiRecommended => write!(f, "AI resolution recommended"),
            Self::AiWithReview => write!(f, "AI resolution with human review recommended"),
            Self::Manual => write!(f, "manual resolution required"),
        }
    }
}

/// Per-hunk analysis record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HunkAnalysis {
    /// Category per the first-match rules.
    pub category: ConflictCategory,
    /// Conflicted lines across both sides.
    pub lines_changed: usize,
    /// Structural complexity token count.
    pub complexity: u32,
}

/// Per-file analysis: the worst hunk wins the category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAnalysis {
    /// Repository-relative path of the conflicted file.
    pub path: String,
    /// Worst category among hunks.
    pub category: ConflictCategory,
    /// Difficulty score, 0-100.
    pub difficulty: u32,
    /// Analyzed hunks, in file order.
    pub hunks: Vec<HunkAnalysis>,
}

/// Summary across all conflicted files of one merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictSummary {
    /// Number of conflicted files.
    pub files: usize,
    /// Total hunks across files.
    pub total_hunks: usize,
    /// Average per-file difficulty.
    pub average_difficulty: f64,
    /// Recommended resolution route.
    pub recommendation: Recommendation,
}

/// Full detector output for one prospective merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictAnalysis {
    /// Whether the dry-run merge conflicted at all.
    pub has_conflicts: bool,
    /// Per-file analyses, sorted by path.
    pub files: Vec<FileAnalysis>,
    /// Summary, present when there are conflicts.
    pub summary: Option<ConflictSummary>,
}

impl ConflictAnalysis {
    /// The analysis for a merge that applied cleanly.
    #[must_use]
    pub const fn clean() -> Self {
        Self {
            has_conflicts: false,
            files: Vec::new(),
            summary: None,
        }
    }
}

const IMPORT_PREFIXES: &[&str] = &["import ", "from ", "use ", "require(", "#include", "extern crate "];
const COMMENT_PREFIXES: &[&str] = &["//", "#", "/*", "*", "*/", "--"];
const FUNCTION_TOKENS: &[&str] = &["fn ", "function ", "def ", "func ", "=>"];
const TYPE_TOKENS: &[&str] = &["class ", "interface ", "struct ", "enum ", "trait ", "type "];
const CONTROL_TOKENS: &[&str] = &[
    "if ", "if(", "for ", "for(", "while ", "while(", "switch", "match ", "async", "await",
    "promise", "Promise", ".then(",
];

fn is_import_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    IMPORT_PREFIXES.iter().any(|p| trimmed.starts_with(p))
        || (trimmed.starts_with("const ") && trimmed.contains("require("))
}

fn is_comment_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    COMMENT_PREFIXES.iter().any(|p| trimmed.starts_with(p))
}

fn all_non_blank(lines: &[String], predicate: fn(&str) -> bool) -> bool {
    let mut saw_content = false;
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        if !predicate(line) {
            return false;
        }
        saw_content = true;
    }
    saw_content
}

fn count_tokens(lines: &[String], tokens: &[&str]) -> u32 {
    let mut count = 0u32;
    for line in lines {
        for token in tokens {
            count = count.saturating_add(
                u32::try_from(line.matches(token).count()).unwrap_or(u32::MAX),
            );
        }
    }
    count
}

fn has_token(lines: &[String], tokens: &[&str]) -> bool {
    lines
        .iter()
        .any(|line| tokens.iter().any(|t| line.contains(t)))
}

fn nesting_tokens(lines: &[String]) -> u32 {
    let braces: usize = lines
        .iter()
        .map(|l| l.matches(['{', '}']).count())
        .sum();
    u32::try_from(braces).unwrap_or(u32::MAX)
}

/// True when both sides carry the same content up to whitespace.
fn whitespace_only(hunk: &ConflictHunk) -> bool {
    let trim_side = |side: &[String]| -> Vec<String> {
        side.iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect()
    };
    trim_side(&hunk.ours) == trim_side(&hunk.theirs)
}

/// Structural complexity of a hunk: nesting tokens, function tokens
/// (weight 2) and control-flow tokens (weight 1), summed over both sides.
#[must_use]
fn hunk_complexity(hunk: &ConflictHunk) -> u32 {
    let both: Vec<String> = hunk
        .ours
        .iter()
        .chain(hunk.theirs.iter())
        .cloned()
        .collect();
    nesting_tokens(&both)
        .saturating_add(count_tokens(&both, FUNCTION_TOKENS).saturating_mul(2))
        .saturating_add(count_tokens(&both, CONTROL_TOKENS))
}

/// Categorize one hunk. Rules apply in order; first match wins.
#[must_use]
pub fn categorize_hunk(hunk: &ConflictHunk) -> ConflictCategory {
    // Trivial rules.
    if whitespace_only(hunk) {
        return ConflictCategory::Trivial;
    }
    if all_non_blank(&hunk.ours, is_import_line) && all_non_blank(&hunk.theirs, is_import_line) {
        return ConflictCategory::Trivial;
    }
    if all_non_blank(&hunk.ours, is_comment_line) && all_non_blank(&hunk.theirs, is_comment_line) {
        return ConflictCategory::Trivial;
    }
    if hunk.ours.len() == 1
        && hunk.theirs.len() == 1
        && hunk.ours[0].trim() == hunk.theirs[0].trim()
    {
        return ConflictCategory::Trivial;
    }

    // Complex rules.
    if hunk.ours.len() > 20 || hunk.theirs.len() > 20 {
        return ConflictCategory::Complex;
    }
    if has_token(&hunk.ours, FUNCTION_TOKENS) && has_token(&hunk.theirs, FUNCTION_TOKENS) {
        return ConflictCategory::Complex;
    }
    if has_token(&hunk.ours, TYPE_TOKENS) && has_token(&hunk.theirs, TYPE_TOKENS) {
        return ConflictCategory::Complex;
    }
    if count_tokens(&hunk.ours, CONTROL_TOKENS) >= 2 && count_tokens(&hunk.theirs, CONTROL_TOKENS) >= 2
    {
        return ConflictCategory::Complex;
    }

    ConflictCategory::Moderate
}

/// Analyze one conflicted file from its parsed hunks.
#[must_use]
pub fn analyze_file(path: &str, hunks: &[ConflictHunk]) -> FileAnalysis {
    let analyses: Vec<HunkAnalysis> = hunks
        .iter()
        .map(|hunk| HunkAnalysis {
            category: categorize_hunk(hunk),
            lines_changed: hunk.lines_changed(),
            complexity: hunk_complexity(hunk),
        })
        .collect();

    let hunk_count = u32::try_from(analyses.len()).unwrap_or(u32::MAX);
    let mut difficulty = hunk_count.saturating_mul(10).min(30);
    for analysis in &analyses {
        let lines = u32::try_from(analysis.lines_changed).unwrap_or(u32::MAX).min(20);
        difficulty = difficulty
            .saturating_add(analysis.category.weight())
            .saturating_add(lines)
            .saturating_add(analysis.complexity.saturating_mul(2));
    }
    difficulty = difficulty.min(100);

    let category = analyses
        .iter()
        .map(|a| a.category)
        .max()
        .unwrap_or(ConflictCategory::Moderate);

    FileAnalysis {
        path: path.to_string(),
        category,
        difficulty,
        hunks: analyses,
    }
}

/// Summarize a set of file analyses into a recommendation.
#[must_use]
pub fn summarize(files: &[FileAnalysis]) -> ConflictSummary {
    let total_hunks = files.iter().map(|f| f.hunks.len()).sum();
    let average_difficulty = if files.is_empty() {
        0.0
    } else {
        let sum: u32 = files.iter().map(|f| f.difficulty).sum();
        f64::from(sum) / files.len() as f64
    };

    let recommendation = if average_difficulty <= 20.0 {
        Recommendation::AutoLikely
    } else if average_difficulty <= 50.0 {
        Recommendation::AiRecommended
    } else if average_difficulty <= 70.0 {
        Recommendation::AiWithReview
    } else {
        Recommendation::Manual
    };

    ConflictSummary {
        files: files.len(),
        total_hunks,
        average_difficulty,
        recommendation,
    }
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
    fn test_trailing_whitespace_is_trivial() {
        let h = hunk(&["let x = 1;  "], &["let x = 1;"]);
        assert_eq!(categorize_hunk(&h), ConflictCategory::Trivial);
        let analysis = analyze_file("src/x.rs", &[h]);
        assert_eq!(analysis.category, ConflictCategory::Trivial);
        assert!(analysis.difficulty <= 20, "difficulty {}", analysis.difficulty);
        let summary = summarize(&[analysis]);
        assert_eq!(summary.recommendation, Recommendation::AutoLikely);
        assert_eq!(
            summary.recommendation.to_string(),
            "auto-resolution likely successful"
        );
    }

    #[test]
    fn test_import_only_is_trivial() {
        let h = hunk(
            &["import { a } from './a';"],
            &["import { a } from './a';", "import { b } from './b';"],
        );
        assert_eq!(categorize_hunk(&h), ConflictCategory::Trivial);
    }

    #[test]
    fn test_comment_only_is_trivial() {
        let h = hunk(&["// old note"], &["// new note", "// more"]);
        assert_eq!(categorize_hunk(&h), ConflictCategory::Trivial);
    }

    #[test]
    fn test_function_signatures_both_sides_is_complex() {
        let h = hunk(
            &["fn handle(a: u32) -> u32 {"],
            &["fn handle(a: u32, b: u32) -> u32 {"],
        );
        assert_eq!(categorize_hunk(&h), ConflictCategory::Complex);
    }

    #[test]
    fn test_long_side_is_complex() {
        let lines: Vec<String> = (0..25).map(|i| format!("line {i};")).collect();
        let h = ConflictHunk {
            ours: lines,
            theirs: vec!["short".to_string()],
            ours_label: None,
            theirs_label: None,
            context_before: Vec::new(),
            context_after: Vec::new(),
        };
        assert_eq!(categorize_hunk(&h), ConflictCategory::Complex);
    }

    #[test]
    fn test_plain_change_is_moderate() {
        let h = hunk(&["let retries = 3;"], &["let retries = 5;"]);
        assert_eq!(categorize_hunk(&h), ConflictCategory::Moderate);
    }

    #[test]
    fn test_file_category_is_worst_hunk() {
        let trivial = hunk(&["// a"], &["// b"]);
        let complex = hunk(&["fn a() {"], &["fn b() {"]);
        let analysis = analyze_file("src/m.rs", &[trivial, complex]);
        assert_eq!(analysis.category, ConflictCategory::Complex);
    }

    #[test]
    fn test_summary_buckets() {
        let make = |difficulty: u32| FileAnalysis {
            path: "f".to_string(),
            category: ConflictCategory::Moderate,
            difficulty,
            hunks: Vec::new(),
        };
        assert_eq!(summarize(&[make(10)]).recommendation, Recommendation::AutoLikely);
        assert_eq!(summarize(&[make(40)]).recommendation, Recommendation::AiRecommended);
        assert_eq!(summarize(&[make(60)]).recommendation, Recommendation::AiWithReview);
        assert_eq!(summarize(&[make(90)]).recommendation, Recommendation::Manual);
        assert_eq!(summarize(&[]).recommendation, Recommendation::AutoLikely);
    }
}
