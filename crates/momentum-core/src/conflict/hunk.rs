//! Conflict-marker parsing.
//!
//! The parser is a three-state machine over lines: `outside`, `ours`,
//! `theirs`. Marker suffixes are preserved as branch labels and the exact
//! marker lines are retained so serialization restores the input.

use serde::{Deserialize, Serialize};

use super::{MARKER_DIVIDER, MARKER_OURS, MARKER_THEIRS};
use crate::error::{Error, Result};

/// One contiguous conflicted region with surrounding context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictHunk {
    /// Lines between the opening marker and the divider.
    pub ours: Vec<String>,
    /// Lines between the divider and the closing marker.
    pub theirs: Vec<String>,
    /// Branch label from the opening marker, if present.
    pub ours_label: Option<String>,
    /// Branch label from the closing marker, if present.
    pub theirs_label: Option<String>,
    /// Clean lines immediately before the hunk.
    pub context_before: Vec<String>,
    /// Clean lines immediately after the hunk.
    pub context_after: Vec<String>,
}

impl ConflictHunk {
    /// Total number of conflicted lines across both sides.
    #[must_use]
    pub fn lines_changed(&self) -> usize {
        self.ours.len() + self.theirs.len()
    }

    /// The larger of the two sides, used for resolution length bounds.
    #[must_use]
    pub fn larger_side(&self) -> usize {
        self.ours.len().max(self.theirs.len())
    }
}

/// A raw hunk as parsed, marker lines included verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RawHunk {
    opening: String,
    divider: String,
    closing: String,
    ours: Vec<String>,
    theirs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Clean(Vec<String>),
    Conflict(RawHunk),
}

enum ParseState {
    Outside,
    Ours,
    Theirs,
}

/// A conflicted file parsed into alternating clean and conflicted segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictDocument {
    segments: Vec<Segment>,
    trailing_newline: bool,
}

impl ConflictDocument {
    /// Parse file content.
    ///
    /// # Errors
    ///
    /// Returns `Error::Parse` when a hunk is opened but never terminated,
    /// or when an opening marker appears inside an unterminated hunk.
    /// Divider and closing markers outside a hunk carry no meaning and
    /// pass through as plain lines.
    pub fn parse(content: &str) -> Result<Self> {
        let trailing_newline = content.ends_with('\n');
        let body = if trailing_newline {
            &content[..content.len() - 1]
        } else {
            content
        };

        let mut segments = Vec::new();
        let mut clean: Vec<String> = Vec::new();
        let mut state = ParseState::Outside;
        let mut opening = String::new();
        let mut divider = String::new();
        let mut ours: Vec<String> = Vec::new();
        let mut theirs: Vec<String> = Vec::new();

        for line in body.split('\n') {
            match state {
                ParseState::Outside => {
                    if line.starts_with(MARKER_OURS) {
                        if !clean.is_empty() {
                            segments.push(Segment::Clean(std::mem::take(&mut clean)));
                        }
                        opening = line.to_string();
                        state = ParseState::Ours;
                    } else {
                        clean.push(line.to_string());
                    }
                }
                ParseState::Ours => {
                    if line.starts_with(MARKER_DIVIDER) {
                        divider = line.to_string();
                        state = ParseState::Theirs;
                    } else if line.starts_with(MARKER_OURS) {
                        return Err(Error::Parse(
                            "nested opening marker inside conflict hunk".to_string(),
                        ));
                    } else {
                        ours.push(line.to_string());
                    }
                }
                ParseState::Theirs => {
                    if line.starts_with(MARKER_THEIRS) {
                        segments.push(Segment::Conflict(RawHunk {
                            opening: std::mem::take(&mut opening),
                            divider: std::mem::take(&mut divider),
                            closing: line.to_string(),
                            ours: std::mem::take(&mut ours),
                            theirs: std::mem::take(&mut theirs),
                        }));
                        state = ParseState::Outside;
                    } else {
                        theirs.push(line.to_string());
                    }
                }
            }
        }

        match state {
            ParseState::Outside => {
                if !clean.is_empty() {
                    segments.push(Segment::Clean(clean));
                }
                Ok(Self {
                    segments,
                    trailing_newline,
                })
            }
            ParseState::Ours | ParseState::Theirs => {
                Err(Error::Parse("unterminated conflict hunk".to_string()))
            }
        }
    }

    /// Restore the original content, modulo trailing-newline normalization.
    #[must_use]
    pub fn serialize(&self) -> String {
        let mut lines: Vec<&str> = Vec::new();
        for segment in &self.segments {
            match segment {
                Segment::Clean(clean) => lines.extend(clean.iter().map(String::as_str)),
                Segment::Conflict(hunk) => {
                    lines.push(&hunk.opening);
                    lines.extend(hunk.ours.iter().map(String::as_str));
                    lines.push(&hunk.divider);
                    lines.extend(hunk.theirs.iter().map(String::as_str));
                    lines.push(&hunk.closing);
                }
            }
        }
        let mut out = lines.join("\n");
        if self.trailing_newline {
            out.push('\n');
        }
        out
    }

    /// Whether the document contains any conflict hunk.
    #[must_use]
    pub fn has_conflicts(&self) -> bool {
        self.hunk_count() > 0
    }

    /// Number of conflict hunks.
    #[must_use]
    pub fn hunk_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Conflict(_)))
            .count()
    }

    /// Extract hunks with context slices of the given width taken from the
    /// adjacent clean segments.
    #[must_use]
    pub fn hunks(&self, context_width: usize) -> Vec<ConflictHunk> {
        let mut out = Vec::new();
        for (i, segment) in self.segments.iter().enumerate() {
            let Segment::Conflict(raw) = segment else {
                continue;
            };
            let context_before = match i.checked_sub(1).map(|p| &self.segments[p]) {
                Some(Segment::Clean(clean)) => {
                    let start = clean.len().saturating_sub(context_width);
                    clean[start..].to_vec()
                }
                _ => Vec::new(),
            };
            let context_after = match self.segments.get(i + 1) {
                Some(Segment::Clean(clean)) => {
                    clean.iter().take(context_width).cloned().collect()
                }
                _ => Vec::new(),
            };
            out.push(ConflictHunk {
                ours: raw.ours.clone(),
                theirs: raw.theirs.clone(),
                ours_label: marker_label(&raw.opening, MARKER_OURS),
                theirs_label: marker_label(&raw.closing, MARKER_THEIRS),
                context_before,
                context_after,
            });
        }
        out
    }

    /// Splice a resolution over the conflicted regions.
    ///
    /// The first marker block is replaced by the resolved content; any
    /// further marker blocks are dropped, since the resolution covers every
    /// hunk that was presented in the prompt. Clean lines are preserved.
    #[must_use]
    pub fn apply_resolution(&self, resolved: &str) -> String {
        let resolved_body = resolved.strip_suffix('\n').unwrap_or(resolved);
        let mut lines: Vec<&str> = Vec::new();
        let mut first_conflict = true;
        for segment in &self.segments {
            match segment {
                Segment::Clean(clean) => lines.extend(clean.iter().map(String::as_str)),
                Segment::Conflict(_) => {
                    if first_conflict {
                        lines.extend(resolved_body.split('\n'));
                        first_conflict = false;
                    }
                }
            }
        }
        let mut out = lines.join("\n");
        if self.trailing_newline {
            out.push('\n');
        }
        out
    }
}

fn marker_label(line: &str, marker: &str) -> Option<String> {
    let suffix = line.strip_prefix(marker)?.trim();
    if suffix.is_empty() {
        None
    } else {
        Some(suffix.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "fn main() {\n<<<<<<< HEAD\n    println!(\"ours\");\n=======\n    println!(\"theirs\");\n>>>>>>> worktree/feature\n}\n";

    #[test]
    fn test_parse_single_hunk() {
        let doc = ConflictDocument::parse(SAMPLE).unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert_eq!(doc.hunk_count(), 1);
        let hunks = doc.hunks(5);
        assert_eq!(hunks[0].ours, vec!["    println!(\"ours\");"]);
        assert_eq!(hunks[0].theirs, vec!["    println!(\"theirs\");"]);
        assert_eq!(hunks[0].ours_label.as_deref(), Some("HEAD"));
        assert_eq!(hunks[0].theirs_label.as_deref(), Some("worktree/feature"));
        assert_eq!(hunks[0].context_before, vec!["fn main() {"]);
        assert_eq!(hunks[0].context_after, vec!["}"]);
    }

    #[test]
    fn test_serialize_round_trip() {
        let doc = ConflictDocument::parse(SAMPLE).unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert_eq!(doc.serialize(), SAMPLE);
    }

    #[test]
    fn test_round_trip_without_trailing_newline() {
        let input = SAMPLE.trim_end_matches('\n');
        let doc = ConflictDocument::parse(input).unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert_eq!(doc.serialize(), input);
    }

    #[test]
    fn test_clean_file_has_no_hunks() {
        let doc = ConflictDocument::parse("a\nb\nc\n")
            .unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert!(!doc.has_conflicts());
        assert_eq!(doc.serialize(), "a\nb\nc\n");
    }

    #[test]
    fn test_unterminated_hunk_is_an_error() {
        let input = "<<<<<<< HEAD\nours\n=======\ntheirs\n";
        assert!(matches!(
            ConflictDocument::parse(input),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_apply_resolution_replaces_block() {
        let doc = ConflictDocument::parse(SAMPLE).unwrap_or_else(|e| panic!("parse failed: {e}"));
        let out = doc.apply_resolution("    println!(\"merged\");");
        assert_eq!(out, "fn main() {\n    println!(\"merged\");\n}\n");
        assert!(!super::super::contains_conflict_markers(&out));
    }

    #[test]
    fn test_apply_resolution_drops_later_blocks() {
        let input = "start\n<<<<<<< a\n1\n=======\n2\n>>>>>>> b\nmid\n<<<<<<< a\n3\n=======\n4\n>>>>>>> b\nend\n";
        let doc = ConflictDocument::parse(input).unwrap_or_else(|e| panic!("parse failed: {e}"));
        let out = doc.apply_resolution("merged");
        assert_eq!(out, "start\nmerged\nmid\nend\n");
    }

    #[test]
    fn test_multiple_hunks_preserve_line_sequences() {
        let input = "a\n<<<<<<< x\n1\n2\n=======\n3\n>>>>>>> y\nb\n<<<<<<< x\n=======\n4\n>>>>>>> y\nc\n";
        let doc = ConflictDocument::parse(input).unwrap_or_else(|e| panic!("parse failed: {e}"));
        let hunks = doc.hunks(2);
        assert_eq!(hunks.len(), 2);
        assert_eq!(hunks[0].ours, vec!["1", "2"]);
        assert_eq!(hunks[0].theirs, vec!["3"]);
        assert!(hunks[1].ours.is_empty());
        assert_eq!(hunks[1].theirs, vec!["4"]);
        assert_eq!(doc.serialize(), input);
    }
}
