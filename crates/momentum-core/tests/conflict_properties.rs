//! Property-based tests for the conflict parser and resolution validation.
//!
//! Properties tested:
//! 1. serialize(parse(x)) restores the original conflicted content, modulo
//!    trailing-newline normalization.
//! 2. Parsed `ours`/`theirs` sequences are exactly the lines between the
//!    corresponding markers.
//! 3. Valid resolutions never leave conflict markers behind; invalid ones
//!    are rejected by at least one of the five rules.

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

use proptest::prelude::*;

use momentum_core::conflict::{contains_conflict_markers, ConflictDocument};
use momentum_core::resolution::{validate_resolution, Language};

// =============================================================================
// STRATEGIES
// =============================================================================

/// A content line that is not a conflict marker.
fn clean_line_strategy() -> impl Strategy<Value = String> {
    "[ a-zA-Z0-9_.;(){}=+-]{0,30}".prop_filter("no markers", |line| {
        !line.starts_with("<<<<<<<")
            && !line.starts_with("=======")
            && !line.starts_with(">>>>>>>")
    })
}

fn lines_strategy(max: usize) -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec(clean_line_strategy(), 0..max)
}

/// Build a conflicted file from alternating clean runs and hunks.
fn conflicted_file_strategy() -> impl Strategy<Value = String> {
    (
        lines_strategy(4),
        proptest::collection::vec(
            (lines_strategy(5), lines_strategy(5), lines_strategy(3)),
            1..4,
        ),
    )
        .prop_map(|(preamble, hunks)| {
            let mut out: Vec<String> = preamble;
            for (ours, theirs, middle) in hunks {
                out.push("<<<<<<< HEAD".to_string());
                out.extend(ours);
                out.push("=======".to_string());
                out.extend(theirs);
                out.push(">>>>>>> worktree/task".to_string());
                out.extend(middle);
            }
            let mut text = out.join("\n");
            text.push('\n');
            text
        })
}

proptest! {
    // =========================================================================
    // PROPERTY 1: ROUND TRIP
    // =========================================================================

    #[test]
    fn prop_parse_serialize_round_trip(content in conflicted_file_strategy()) {
        let doc = ConflictDocument::parse(&content).expect("generated content parses");
        prop_assert_eq!(doc.serialize(), content);
    }

    #[test]
    fn prop_clean_content_round_trips_with_no_hunks(lines in lines_strategy(10)) {
        let content = lines.join("\n");
        let doc = ConflictDocument::parse(&content).expect("clean content parses");
        prop_assert!(!doc.has_conflicts());
        prop_assert_eq!(doc.serialize(), content);
    }

    // =========================================================================
    // PROPERTY 2: HUNK LINE FIDELITY
    // =========================================================================

    #[test]
    fn prop_hunk_sides_match_input(
        ours in lines_strategy(6),
        theirs in lines_strategy(6),
    ) {
        let mut lines = vec!["context".to_string(), "<<<<<<< HEAD".to_string()];
        lines.extend(ours.clone());
        lines.push("=======".to_string());
        lines.extend(theirs.clone());
        lines.push(">>>>>>> other".to_string());
        let content = lines.join("\n");

        let doc = ConflictDocument::parse(&content).expect("parses");
        let hunks = doc.hunks(5);
        prop_assert_eq!(hunks.len(), 1);
        prop_assert_eq!(&hunks[0].ours, &ours);
        prop_assert_eq!(&hunks[0].theirs, &theirs);
    }

    // =========================================================================
    // PROPERTY 3: APPLIED RESOLUTIONS CARRY NO MARKERS
    // =========================================================================

    #[test]
    fn prop_applied_resolution_is_marker_free(
        content in conflicted_file_strategy(),
        resolved in clean_line_strategy(),
    ) {
        let doc = ConflictDocument::parse(&content).expect("parses");
        let applied = doc.apply_resolution(&resolved);
        prop_assert!(!contains_conflict_markers(&applied));
    }

    #[test]
    fn prop_marker_bearing_resolutions_rejected(content in conflicted_file_strategy()) {
        let doc = ConflictDocument::parse(&content).expect("parses");
        let hunks = doc.hunks(5);
        // Echoing the conflicted input back is never a valid resolution.
        let verdict = validate_resolution(&content, &hunks, Language::Unknown);
        prop_assert!(verdict.is_err());
    }
}

// =============================================================================
// FIXED CASES
// =============================================================================

#[test]
fn test_unterminated_hunks_rejected() {
    for input in [
        "<<<<<<< HEAD\nours",
        "<<<<<<< HEAD\nours\n=======\ntheirs",
    ] {
        assert!(ConflictDocument::parse(input).is_err(), "accepted: {input:?}");
    }
}

#[test]
fn test_labels_preserved() {
    let content = "<<<<<<< HEAD\na\n=======\nb\n>>>>>>> worktree/t-1\n";
    let doc = ConflictDocument::parse(content).expect("parses");
    let hunks = doc.hunks(5);
    assert_eq!(hunks[0].ours_label.as_deref(), Some("HEAD"));
    assert_eq!(hunks[0].theirs_label.as_deref(), Some("worktree/t-1"));
}
