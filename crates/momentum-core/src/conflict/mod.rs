//! Conflict parsing and characterization.
//!
//! A conflicted file is modeled as a [`ConflictDocument`]: an alternating
//! sequence of clean-line runs and marker-delimited hunks. The document
//! serializes back to the original bytes (modulo trailing-newline
//! normalization), which is what makes preview-only analysis and in-place
//! resolution splicing safe.

mod analyze;
mod hunk;

pub use analyze::{
    analyze_file, categorize_hunk, summarize, ConflictAnalysis, ConflictCategory, ConflictSummary,
    FileAnalysis, HunkAnalysis, Recommendation,
};
pub use hunk::{ConflictDocument, ConflictHunk};

/// Opening conflict marker prefix.
pub const MARKER_OURS: &str = "<<<<<<<";
/// Divider conflict marker prefix.
pub const MARKER_DIVIDER: &str = "=======";
/// Closing conflict marker prefix.
pub const MARKER_THEIRS: &str = ">>>>>>>";

/// True when the content contains any of the three conflict markers at the
/// start of a line.
#[must_use]
pub fn contains_conflict_markers(content: &str) -> bool {
    content.lines().any(|line| {
        line.starts_with(MARKER_OURS)
            || line.starts_with(MARKER_DIVIDER)
            || line.starts_with(MARKER_THEIRS)
    })
}
