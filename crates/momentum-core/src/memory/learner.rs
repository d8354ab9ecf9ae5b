//! Pattern extraction from executions and ranked suggestions.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::records::{PatternKind, PatternRecord};

/// What a successful execution produced, as reported by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Files the run created, repository-relative.
    #[serde(default)]
    pub created_files: Vec<String>,
    /// Import statements the run added.
    #[serde(default)]
    pub imports: Vec<String>,
    /// Test files the run created.
    #[serde(default)]
    pub test_files: Vec<String>,
    /// Errors hit during the run, in order.
    #[serde(default)]
    pub errors: Vec<String>,
    /// Resolutions for those errors, index-paired.
    #[serde(default)]
    pub resolutions: Vec<String>,
    /// The commit message, if the run committed.
    #[serde(default)]
    pub commit_message: Option<String>,
}

const NAMING_PREFIXES: &[&str] = &[
    "get", "set", "create", "update", "delete", "fetch", "load", "save", "handle", "process",
];
const NAMING_SUFFIXES: &[&str] = &[
    "Manager", "Store", "Runner", "Handler", "Service", "Controller", "Helper", "Util",
];

/// Detect the naming style of one basename.
#[must_use]
pub fn detect_naming_style(name: &str) -> &'static str {
    let has_hyphen = name.contains('-');
    let has_underscore = name.contains('_');
    let has_upper = name.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = name.chars().any(|c| c.is_ascii_lowercase());
    let first_lower = name.chars().next().is_some_and(|c| c.is_ascii_lowercase());
    let first_upper = name.chars().next().is_some_and(|c| c.is_ascii_uppercase());
    let word_chars_only = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if !word_chars_only || name.is_empty() {
        return "unknown";
    }
    if has_hyphen && !has_underscore && !has_upper {
        return "kebab-case";
    }
    if has_underscore && !has_hyphen && !has_upper {
        return "snake_case";
    }
    if first_lower && has_upper && !has_hyphen && !has_underscore {
        return "camelCase";
    }
    if first_upper && has_lower && !has_hyphen && !has_underscore {
        return "PascalCase";
    }
    "unknown"
}

fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        // Strip compound test extensions like `.test` / `.spec`.
        .trim_end_matches(".test")
        .trim_end_matches(".spec")
        .to_string()
}

fn parent_dir(path: &str) -> Option<String> {
    Path::new(path)
        .parent()
        .and_then(|p| p.to_str())
        .filter(|p| !p.is_empty())
        .map(ToString::to_string)
}

fn extension(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(ToString::to_string)
}

fn file_structure_patterns(files: &[String], out: &mut Vec<(PatternKind, String)>) {
    let mut dirs: BTreeSet<String> = BTreeSet::new();
    let mut extensions_by_dir: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for file in files {
        if let Some(dir) = parent_dir(file) {
            if let Some(ext) = extension(file) {
                extensions_by_dir.entry(dir.clone()).or_default().insert(ext);
            }
            dirs.insert(dir);
        }
    }

    for dir in &dirs {
        out.push((PatternKind::FileStructure, dir.clone()));
    }
    for (dir, exts) in &extensions_by_dir {
        if exts.len() > 1 {
            let listed = exts.iter().join(", ");
            out.push((PatternKind::FileStructure, format!("{dir}: {listed}")));
        }
    }
}

fn naming_patterns(files: &[String], out: &mut Vec<(PatternKind, String)>) {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    for file in files {
        let stem = file_stem(file);
        if stem.is_empty() {
            continue;
        }
        let style = detect_naming_style(&stem);
        if style != "unknown" {
            seen.insert(format!("style:{style}"));
        }
        let lower = stem.to_lowercase();
        for prefix in NAMING_PREFIXES {
            if lower.starts_with(prefix) && stem.len() > prefix.len() {
                seen.insert(format!("prefix:{prefix}"));
            }
        }
        for suffix in NAMING_SUFFIXES {
            if stem.ends_with(suffix) {
                seen.insert(format!("suffix:{suffix}"));
            }
        }
    }
    out.extend(seen.into_iter().map(|p| (PatternKind::NamingConvention, p)));
}

fn import_source(statement: &str) -> Option<String> {
    let bytes = statement.as_bytes();
    let open = bytes.iter().position(|&b| b == b'\'' || b == b'"')?;
    let quote = bytes[open];
    let close = bytes[open + 1..].iter().position(|&b| b == quote)?;
    statement.get(open + 1..open + 1 + close).map(ToString::to_string)
}

fn import_patterns(imports: &[String], out: &mut Vec<(PatternKind, String)>) {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    for statement in imports {
        let binding = if statement.contains('{') {
            "named-import"
        } else {
            "default-import"
        };
        let source = import_source(statement).unwrap_or_default();
        let origin = if source.starts_with("../") {
            "parent-relative-import"
        } else if source.starts_with("./") {
            "relative-import"
        } else {
            "external-import"
        };
        seen.insert(format!("{binding} {origin}"));
    }
    out.extend(seen.into_iter().map(|p| (PatternKind::ImportPattern, p)));
}

fn test_patterns(test_files: &[String], out: &mut Vec<(PatternKind, String)>) {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    for file in test_files {
        let name = Path::new(file)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("");
        for suffix in [".test.", ".spec.", "_test.", "-test."] {
            if name.contains(suffix) {
                seen.insert(format!("suffix:{}", suffix.trim_end_matches('.')));
            }
        }
        if name.starts_with("test_") {
            seen.insert("prefix:test_".to_string());
        }
        if let Some(dir) = parent_dir(file) {
            if dir.split('/').any(|part| {
                part.eq_ignore_ascii_case("test")
                    || part.eq_ignore_ascii_case("tests")
                    || part.eq_ignore_ascii_case("__tests__")
            }) {
                seen.insert(format!("dir:{dir}"));
            }
        }
    }
    out.extend(seen.into_iter().map(|p| (PatternKind::TestPattern, p)));
}

fn commit_pattern(message: &str) -> Option<String> {
    let header = message.lines().next()?;
    let colon = header.find(':')?;
    let prefix = header.get(..colon)?;
    let (kind, scope) = match prefix.find('(') {
        Some(open) => {
            let close = prefix.rfind(')')?;
            (prefix.get(..open)?, prefix.get(open + 1..close))
        }
        None => (prefix, None),
    };
    if kind.is_empty() || !kind.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some(scope.map_or_else(
        || kind.to_string(),
        |s| format!("{kind}({s})"),
    ))
}

/// Distill reusable patterns from one execution summary.
#[must_use]
pub fn extract_patterns(summary: &ExecutionSummary) -> Vec<(PatternKind, String)> {
    let mut out = Vec::new();

    file_structure_patterns(&summary.created_files, &mut out);
    naming_patterns(&summary.created_files, &mut out);
    import_patterns(&summary.imports, &mut out);

    for (error, resolution) in summary.errors.iter().zip(summary.resolutions.iter()) {
        out.push((
            PatternKind::ErrorResolution,
            format!("{error} -> {resolution}"),
        ));
    }

    test_patterns(&summary.test_files, &mut out);

    if let Some(pattern) = summary.commit_message.as_deref().and_then(commit_pattern) {
        out.push((PatternKind::CommitPattern, pattern));
    }

    out
}

/// Filter context for suggestions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuggestionContext {
    /// Restrict to one pattern kind.
    pub kind: Option<PatternKind>,
    /// Keywords the pattern text should mention.
    pub keywords: Vec<String>,
    /// A path to overlap against file-structure patterns.
    pub path: Option<String>,
}

/// A scored suggestion.
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    /// The suggested pattern.
    pub pattern: PatternRecord,
    /// Confidence in [0, 1].
    pub confidence: f64,
}

const RECENCY_WINDOW_DAYS: f64 = 30.0;

fn confidence(pattern: &PatternRecord, context: &SuggestionContext, now: DateTime<Utc>) -> f64 {
    let frequency_factor = (pattern.frequency as f64 / 10.0).min(1.0);

    let age_days = (now - pattern.last_seen).num_seconds().max(0) as f64 / 86_400.0;
    let recency_factor = (1.0 - age_days / RECENCY_WINDOW_DAYS).max(0.0);

    let kind_bonus = if context.kind == Some(pattern.kind) { 0.5 } else { 0.0 };
    let keyword_factor = if context.keywords.is_empty() {
        0.0
    } else {
        let text = pattern.pattern.to_lowercase();
        let matched = context
            .keywords
            .iter()
            .filter(|k| text.contains(&k.to_lowercase()))
            .count();
        matched as f64 / context.keywords.len() as f64 * 0.5
    };
    let similarity_factor = (kind_bonus + keyword_factor).min(1.0);

    0.4 * frequency_factor + 0.3 * recency_factor + 0.3 * similarity_factor
}

fn path_overlaps(pattern_dir: &str, path: &str) -> bool {
    let pattern_parts: BTreeSet<&str> = pattern_dir.split('/').collect();
    path.split('/').any(|part| pattern_parts.contains(part))
}

/// Rank patterns for a context.
///
/// Filters by kind, then keyword substring, then path overlap for
/// file-structure patterns; when every filter comes back empty the highest
/// frequency patterns are suggested instead.
#[must_use]
pub fn suggest(
    patterns: &[PatternRecord],
    context: &SuggestionContext,
    now: DateTime<Utc>,
    limit: usize,
) -> Vec<Suggestion> {
    let mut candidates: Vec<&PatternRecord> = patterns
        .iter()
        .filter(|p| context.kind.map_or(true, |kind| p.kind == kind))
        .collect();

    if !context.keywords.is_empty() {
        let keyword_matched: Vec<&PatternRecord> = candidates
            .iter()
            .copied()
            .filter(|p| {
                let text = p.pattern.to_lowercase();
                context
                    .keywords
                    .iter()
                    .any(|k| text.contains(&k.to_lowercase()))
            })
            .collect();
        if !keyword_matched.is_empty() {
            candidates = keyword_matched;
        }
    }

    if let Some(path) = &context.path {
        let path_matched: Vec<&PatternRecord> = candidates
            .iter()
            .copied()
            .filter(|p| p.kind != PatternKind::FileStructure || path_overlaps(&p.pattern, path))
            .collect();
        if !path_matched.is_empty() {
            candidates = path_matched;
        }
    }

    if candidates.is_empty() {
        // Fallback: highest-frequency patterns of any kind.
        candidates = patterns.iter().collect();
    }

    let mut suggestions: Vec<Suggestion> = candidates
        .into_iter()
        .map(|p| Suggestion {
            pattern: p.clone(),
            confidence: confidence(p, context, now),
        })
        .collect();

    suggestions.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.pattern.frequency.cmp(&a.pattern.frequency))
            .then_with(|| a.pattern.pattern.cmp(&b.pattern.pattern))
    });
    suggestions.truncate(limit);
    suggestions
}
