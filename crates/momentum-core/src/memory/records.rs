//! Memory envelope and record collections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::hash::short_id;
use super::similarity::similarity;

/// Current schema version of the memory envelope.
pub const SCHEMA_VERSION: u32 = 2;

/// The kind of a learned pattern.
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
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum PatternKind {
    /// Directory layout and extension groupings.
    FileStructure,
    /// Naming styles, prefixes and suffixes.
    NamingConvention,
    /// Import statement shapes.
    ImportPattern,
    /// Error-to-resolution pairs.
    ErrorResolution,
    /// Test file suffixes and directories.
    TestPattern,
    /// Conventional-commit headers.
    CommitPattern,
}

/// A reusable pattern distilled from past executions.
///
/// Unique on (kind, pattern); re-insertion increments the frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRecord {
    /// Opaque identifier.
    pub id: String,
    /// Pattern kind.
    pub kind: PatternKind,
    /// Pattern text.
    pub pattern: String,
    /// How many times this pattern was observed.
    pub frequency: u64,
    /// First observation.
    pub created_at: DateTime<Utc>,
    /// Latest observation.
    pub last_seen: DateTime<Utc>,
}

/// A cached decision: immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Opaque identifier.
    pub id: String,
    /// Digest of the normalized context plus the question.
    pub context_hash: String,
    /// The question as asked.
    pub question: String,
    /// The cached answer.
    pub answer: String,
    /// The original (un-normalized) context.
    pub context: serde_json::Value,
    /// When the decision was cached.
    pub timestamp: DateTime<Utc>,
}

/// One recorded engine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Opaque identifier.
    pub id: String,
    /// The plan document this run executed.
    pub plan_path: String,
    /// Wall time in milliseconds.
    pub duration_ms: u64,
    /// Whether the run succeeded.
    pub success: bool,
    /// Errors encountered.
    pub errors: Vec<String>,
    /// Patterns consulted during the run.
    pub patterns_used: Vec<String>,
    /// When the run finished.
    pub timestamp: DateTime<Utc>,
}

/// Analysis metadata for one source file. Unique on path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Opaque identifier.
    pub id: String,
    /// Repository-relative path.
    pub path: String,
    /// When the file was last analyzed.
    pub last_analyzed: DateTime<Utc>,
    /// Digest of the last analysis summary.
    pub summary_hash: String,
    /// Patterns associated with the file.
    pub patterns: Vec<String>,
}

/// Aggregate counts over the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Schema version.
    pub version: u32,
    /// Number of pattern records.
    pub patterns: usize,
    /// Number of decision records.
    pub decisions: usize,
    /// Number of execution records.
    pub executions: usize,
    /// Number of file records.
    pub files: usize,
}

/// Which collections a `clear` call empties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClearSelector {
    /// Clear patterns.
    pub patterns: bool,
    /// Clear decisions.
    pub decisions: bool,
    /// Clear executions.
    pub executions: bool,
    /// Clear files.
    pub files: bool,
}

impl ClearSelector {
    /// Select every collection.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            patterns: true,
            decisions: true,
            executions: true,
            files: true,
        }
    }
}

/// The whole-file memory document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEnvelope {
    /// Schema version; migrations bring older envelopes forward.
    pub version: u32,
    /// Learned patterns.
    #[serde(default)]
    pub patterns: Vec<PatternRecord>,
    /// Cached decisions.
    #[serde(default)]
    pub decisions: Vec<DecisionRecord>,
    /// Execution history, append-only.
    #[serde(default)]
    pub executions: Vec<ExecutionRecord>,
    /// Per-file analysis metadata.
    #[serde(default)]
    pub files: Vec<FileRecord>,
}

impl Default for MemoryEnvelope {
    fn default() -> Self {
        Self::empty()
    }
}

impl MemoryEnvelope {
    /// A fresh, empty envelope at the current schema version.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            version: SCHEMA_VERSION,
            patterns: Vec::new(),
            decisions: Vec::new(),
            executions: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Upsert a pattern on (kind, text). Existing patterns gain frequency
    /// and a fresh `last_seen`; new ones start at frequency 1.
    pub fn upsert_pattern(&mut self, kind: PatternKind, pattern: &str, now: DateTime<Utc>) {
        if let Some(existing) = self
            .patterns
            .iter_mut()
            .find(|p| p.kind == kind && p.pattern == pattern)
        {
            existing.frequency = existing.frequency.saturating_add(1);
            existing.last_seen = now;
            return;
        }
        self.patterns.push(PatternRecord {
            id: format!("pat-{}", short_id(&format!("{kind}:{pattern}"))),
            kind,
            pattern: pattern.to_string(),
            frequency: 1,
            created_at: now,
            last_seen: now,
        });
    }

    /// Up to `limit` patterns of a kind, sorted by frequency then recency,
    /// both descending.
    #[must_use]
    pub fn patterns_by_kind(&self, kind: PatternKind, limit: usize) -> Vec<&PatternRecord> {
        let mut matching: Vec<&PatternRecord> =
            self.patterns.iter().filter(|p| p.kind == kind).collect();
        matching.sort_by(|a, b| {
            b.frequency
                .cmp(&a.frequency)
                .then(b.last_seen.cmp(&a.last_seen))
                .then(a.pattern.cmp(&b.pattern))
        });
        matching.truncate(limit);
        matching
    }

    /// Patterns whose normalized edit-distance similarity to `text` is at
    /// least `threshold`, best first.
    #[must_use]
    pub fn similar_patterns(&self, text: &str, threshold: f64) -> Vec<(&PatternRecord, f64)> {
        let mut scored: Vec<(&PatternRecord, f64)> = self
            .patterns
            .iter()
            .map(|p| (p, similarity(&p.pattern, text)))
            .filter(|(_, score)| *score >= threshold)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
    }

    /// Find a file record by path.
    #[must_use]
    pub fn file_by_path(&self, path: &str) -> Option<&FileRecord> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Upsert a file record on path, taking the newer analysis.
    pub fn upsert_file(&mut self, record: FileRecord) {
        if let Some(existing) = self.files.iter_mut().find(|f| f.path == record.path) {
            if record.last_analyzed >= existing.last_analyzed {
                existing.last_analyzed = record.last_analyzed;
                existing.summary_hash = record.summary_hash;
                existing.patterns = record.patterns;
            }
            return;
        }
        self.files.push(record);
    }

    /// Merge another envelope into this one.
    ///
    /// Patterns add frequencies and take the newer `last_seen`; decisions
    /// take the newer timestamp per context hash; executions append; files
    /// take the newer `last_analyzed`.
    pub fn merge_from(&mut self, other: Self) {
        for pattern in other.patterns {
            if let Some(existing) = self
                .patterns
                .iter_mut()
                .find(|p| p.kind == pattern.kind && p.pattern == pattern.pattern)
            {
                existing.frequency = existing.frequency.saturating_add(pattern.frequency);
                if pattern.last_seen > existing.last_seen {
                    existing.last_seen = pattern.last_seen;
                }
                if pattern.created_at < existing.created_at {
                    existing.created_at = pattern.created_at;
                }
            } else {
                self.patterns.push(pattern);
            }
        }

        for decision in other.decisions {
            if let Some(existing) = self
                .decisions
                .iter_mut()
                .find(|d| d.context_hash == decision.context_hash)
            {
                if decision.timestamp > existing.timestamp {
                    *existing = decision;
                }
            } else {
                self.decisions.push(decision);
            }
        }

        self.executions.extend(other.executions);

        for file in other.files {
            self.upsert_file(file);
        }
    }

    /// Replace every collection with the other envelope's.
    pub fn replace_with(&mut self, other: Self) {
        *self = Self {
            version: SCHEMA_VERSION,
            ..other
        };
    }

    /// Empty the selected collections.
    pub fn clear(&mut self, selector: ClearSelector) {
        if selector.patterns {
            self.patterns.clear();
        }
        if selector.decisions {
            self.decisions.clear();
        }
        if selector.executions {
            self.executions.clear();
        }
        if selector.files {
            self.files.clear();
        }
    }

    /// Aggregate counts.
    #[must_use]
    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            version: self.version,
            patterns: self.patterns.len(),
            decisions: self.decisions.len(),
            executions: self.executions.len(),
            files: self.files.len(),
        }
    }
}
