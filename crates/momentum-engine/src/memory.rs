//! JSON-file memory store and the TTL decision cache.
//!
//! The store is a whole-file write-through over an in-memory mirror: the
//! on-disk file is always a complete valid envelope after every save
//! (write to a temp file, then rename). All mutating operations are
//! serialized through one async mutex.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

use momentum_core::memory::{
    context_hash, extract_patterns, migrate, repair, suggest, ClearSelector, DecisionRecord,
    ExecutionRecord, ExecutionSummary, FileRecord, MemoryEnvelope, MemoryStats, PatternKind,
    PatternRecord, RepairReport, Suggestion, SuggestionContext,
};

use crate::config::MemoryConfig;
use crate::error::{Error, Result};

/// How `import` treats existing collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStrategy {
    /// Merge record by record.
    Merge,
    /// Blanket substitution of each collection.
    Replace,
}

/// Durable, process-local persistence over the memory envelope.
pub struct MemoryStore {
    path: PathBuf,
    similarity_threshold: f64,
    state: Mutex<Option<MemoryEnvelope>>,
}

impl MemoryStore {
    /// Create a store; nothing is read until first use.
    #[must_use]
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            path: config.path.clone(),
            similarity_threshold: config.similarity_threshold,
            state: Mutex::new(None),
        }
    }

    /// Lazily load the envelope, tolerating a missing or unparseable file
    /// by initializing an empty envelope and saving it.
    async fn loaded(&self) -> Result<MutexGuard<'_, Option<MemoryEnvelope>>> {
        let mut guard = self.state.lock().await;
        if guard.is_none() {
            let envelope = self.load_from_disk().await?;
            self.persist(&envelope).await?;
            *guard = Some(envelope);
        }
        Ok(guard)
    }

    async fn load_from_disk(&self) -> Result<MemoryEnvelope> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(MemoryEnvelope::empty());
            }
            Err(e) => return Err(e.into()),
        };

        let value: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    "memory file '{}' is unparseable ({e}); starting empty",
                    self.path.display()
                );
                return Ok(MemoryEnvelope::empty());
            }
        };

        // Migration failures are explicit errors, not silent resets.
        migrate(value).map_err(Error::Core)
    }

    async fn persist(&self, envelope: &MemoryEnvelope) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let serialized = serde_json::to_string_pretty(envelope)
            .map_err(|e| Error::Store(format!("serialize envelope: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serialized).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut MemoryEnvelope) -> T,
    ) -> Result<T> {
        let mut guard = self.loaded().await?;
        let Some(envelope) = guard.as_mut() else {
            return Err(Error::Store("envelope missing after load".to_string()));
        };
        let out = apply(envelope);
        self.persist(envelope).await?;
        Ok(out)
    }

    async fn read<T>(&self, apply: impl FnOnce(&MemoryEnvelope) -> T) -> Result<T> {
        let guard = self.loaded().await?;
        let Some(envelope) = guard.as_ref() else {
            return Err(Error::Store("envelope missing after load".to_string()));
        };
        Ok(apply(envelope))
    }

    /// Force a save of the current state.
    pub async fn save(&self) -> Result<()> {
        self.mutate(|_| ()).await
    }

    /// Upsert a pattern on (kind, text).
    pub async fn add_pattern(&self, kind: PatternKind, pattern: &str) -> Result<()> {
        let now = Utc::now();
        self.mutate(|envelope| envelope.upsert_pattern(kind, pattern, now))
            .await
    }

    /// Up to `limit` patterns of one kind, by frequency then recency.
    pub async fn get_patterns(&self, kind: PatternKind, limit: usize) -> Result<Vec<PatternRecord>> {
        self.read(|envelope| {
            envelope
                .patterns_by_kind(kind, limit)
                .into_iter()
                .cloned()
                .collect()
        })
        .await
    }

    /// Patterns similar to `text` at or above the threshold (the
    /// configured default when `None`).
    pub async fn find_similar_patterns(
        &self,
        text: &str,
        threshold: Option<f64>,
    ) -> Result<Vec<(PatternRecord, f64)>> {
        let threshold = threshold.unwrap_or(self.similarity_threshold);
        self.read(|envelope| {
            envelope
                .similar_patterns(text, threshold)
                .into_iter()
                .map(|(pattern, score)| (pattern.clone(), score))
                .collect()
        })
        .await
    }

    /// Cache a decision, replacing any prior decision with the same
    /// normalized (context, question) hash.
    pub async fn cache_decision(
        &self,
        context: &serde_json::Value,
        question: &str,
        answer: &str,
    ) -> Result<DecisionRecord> {
        let hash = context_hash(context, question);
        let record = DecisionRecord {
            id: format!("dec-{}", uuid::Uuid::new_v4()),
            context_hash: hash.clone(),
            question: question.to_string(),
            answer: answer.to_string(),
            context: context.clone(),
            timestamp: Utc::now(),
        };
        let stored = record.clone();
        self.mutate(move |envelope| {
            envelope.decisions.retain(|d| d.context_hash != hash);
            envelope.decisions.push(stored);
        })
        .await?;
        Ok(record)
    }

    /// Look up a cached decision.
    pub async fn get_cached_decision(
        &self,
        context: &serde_json::Value,
        question: &str,
    ) -> Result<Option<DecisionRecord>> {
        let hash = context_hash(context, question);
        self.read(move |envelope| {
            envelope
                .decisions
                .iter()
                .find(|d| d.context_hash == hash)
                .cloned()
        })
        .await
    }

    /// Delete the decision for a normalized (context, question). Returns
    /// whether anything was removed.
    pub async fn delete_cached_decision(
        &self,
        context: &serde_json::Value,
        question: &str,
    ) -> Result<bool> {
        let hash = context_hash(context, question);
        self.delete_decisions_where(move |d| d.context_hash == hash)
            .await
            .map(|removed| removed > 0)
    }

    /// Delete every decision matching the predicate; returns the count.
    pub async fn delete_decisions_where(
        &self,
        predicate: impl Fn(&DecisionRecord) -> bool + Send,
    ) -> Result<usize> {
        self.mutate(move |envelope| {
            let before = envelope.decisions.len();
            envelope.decisions.retain(|d| !predicate(d));
            before - envelope.decisions.len()
        })
        .await
    }

    /// Delete decisions older than the cutoff; returns the count.
    pub async fn delete_expired_decisions(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.delete_decisions_where(move |d| d.timestamp < cutoff)
            .await
    }

    /// Append an execution record. History is linear; no deduplication.
    pub async fn record_execution(
        &self,
        plan_path: &str,
        duration_ms: u64,
        success: bool,
        errors: Vec<String>,
        patterns_used: Vec<String>,
    ) -> Result<ExecutionRecord> {
        let record = ExecutionRecord {
            id: format!("exec-{}", uuid::Uuid::new_v4()),
            plan_path: plan_path.to_string(),
            duration_ms,
            success,
            errors,
            patterns_used,
            timestamp: Utc::now(),
        };
        let stored = record.clone();
        self.mutate(move |envelope| envelope.executions.push(stored))
            .await?;
        Ok(record)
    }

    /// The most recent `limit` executions, oldest first.
    pub async fn get_execution_history(&self, limit: usize) -> Result<Vec<ExecutionRecord>> {
        self.read(move |envelope| {
            let start = envelope.executions.len().saturating_sub(limit);
            envelope.executions[start..].to_vec()
        })
        .await
    }

    /// Upsert file analysis metadata by path.
    pub async fn update_file(
        &self,
        path: &str,
        summary_hash: &str,
        patterns: Vec<String>,
    ) -> Result<()> {
        let record = FileRecord {
            id: format!("file-{}", uuid::Uuid::new_v4()),
            path: path.to_string(),
            last_analyzed: Utc::now(),
            summary_hash: summary_hash.to_string(),
            patterns,
        };
        self.mutate(move |envelope| envelope.upsert_file(record))
            .await
    }

    /// Look up file metadata by path.
    pub async fn get_file(&self, path: &str) -> Result<Option<FileRecord>> {
        let path = path.to_string();
        self.read(move |envelope| envelope.file_by_path(&path).cloned())
            .await
    }

    /// Aggregate counts.
    pub async fn stats(&self) -> Result<MemoryStats> {
        self.read(MemoryEnvelope::stats).await
    }

    /// A full copy of the envelope.
    pub async fn export(&self) -> Result<MemoryEnvelope> {
        self.read(Clone::clone).await
    }

    /// Import another envelope with the given strategy.
    pub async fn import(&self, envelope: MemoryEnvelope, strategy: ImportStrategy) -> Result<()> {
        self.mutate(move |current| match strategy {
            ImportStrategy::Merge => current.merge_from(envelope),
            ImportStrategy::Replace => current.replace_with(envelope),
        })
        .await
    }

    /// Empty the selected collections.
    pub async fn clear(&self, selector: ClearSelector) -> Result<()> {
        self.mutate(move |envelope| envelope.clear(selector)).await
    }

    /// Repair the on-disk document: materialize missing collections, set a
    /// missing version, drop malformed records.
    pub async fn repair(&self) -> Result<RepairReport> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => "{}".to_string(),
            Err(e) => return Err(e.into()),
        };
        let value: serde_json::Value =
            serde_json::from_str(&raw).unwrap_or_else(|_| serde_json::json!({}));
        let (envelope, report) = repair(value).map_err(Error::Core)?;

        let mut guard = self.state.lock().await;
        self.persist(&envelope).await?;
        *guard = Some(envelope);
        tracing::info!(
            "memory repair: {} record(s) dropped, {} collection(s) added",
            report.records_dropped,
            report.collections_added
        );
        Ok(report)
    }

    /// Distill patterns from an execution summary and store them. Returns
    /// how many patterns were upserted.
    pub async fn learn_from(&self, summary: &ExecutionSummary) -> Result<usize> {
        let extracted = extract_patterns(summary);
        let now = Utc::now();
        self.mutate(move |envelope| {
            let count = extracted.len();
            for (kind, text) in extracted {
                envelope.upsert_pattern(kind, &text, now);
            }
            count
        })
        .await
    }

    /// Ranked pattern suggestions for a context.
    pub async fn suggest_patterns(
        &self,
        context: &SuggestionContext,
        limit: usize,
    ) -> Result<Vec<Suggestion>> {
        let now = Utc::now();
        self.read(move |envelope| suggest(&envelope.patterns, context, now, limit))
            .await
    }
}

/// Hit/miss counters since the last reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Cache hits.
    pub hits: u64,
    /// Cache misses (including TTL evictions).
    pub misses: u64,
}

impl CacheStats {
    /// `hits / (hits + misses)`, or 0 when both are 0.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

/// TTL-bounded memo of (context, question) -> answer over the store's
/// decisions collection.
pub struct DecisionCache {
    store: Arc<MemoryStore>,
    ttl: Duration,
    counters: Mutex<CacheStats>,
}

impl DecisionCache {
    /// Create a cache with the given TTL in seconds.
    #[must_use]
    pub fn new(store: Arc<MemoryStore>, ttl_secs: u64) -> Self {
        Self {
            store,
            ttl: Duration::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX)),
            counters: Mutex::new(CacheStats::default()),
        }
    }

    /// Cache an answer.
    pub async fn put(
        &self,
        context: &serde_json::Value,
        question: &str,
        answer: &str,
    ) -> Result<()> {
        self.store
            .cache_decision(context, question, answer)
            .await
            .map(|_| ())
    }

    /// Look up an answer. Expired entries are evicted and count as
    /// misses; an unknown key is a miss, not an error.
    pub async fn get(
        &self,
        context: &serde_json::Value,
        question: &str,
    ) -> Result<Option<String>> {
        let decision = self.store.get_cached_decision(context, question).await?;
        let now = Utc::now();

        match decision {
            Some(decision) if now - decision.timestamp <= self.ttl => {
                self.counters.lock().await.hits += 1;
                Ok(Some(decision.answer))
            }
            Some(_) => {
                // Expired: evict and miss.
                self.store.delete_cached_decision(context, question).await?;
                self.counters.lock().await.misses += 1;
                Ok(None)
            }
            None => {
                self.counters.lock().await.misses += 1;
                Ok(None)
            }
        }
    }

    /// Remove one cached decision.
    pub async fn invalidate(&self, context: &serde_json::Value, question: &str) -> Result<bool> {
        self.store.delete_cached_decision(context, question).await
    }

    /// Remove every decision whose normalized context matches.
    pub async fn invalidate_by_context(&self, context: &serde_json::Value) -> Result<usize> {
        let normalized = momentum_core::memory::normalize_context(context);
        self.store
            .delete_decisions_where(move |decision| {
                momentum_core::memory::normalize_context(&decision.context) == normalized
            })
            .await
    }

    /// Remove every expired decision; returns the count.
    pub async fn clear_expired(&self) -> Result<usize> {
        let cutoff = Utc::now() - self.ttl;
        self.store.delete_expired_decisions(cutoff).await
    }

    /// Keep only the `keep` most recent decisions; returns how many were
    /// pruned.
    pub async fn prune(&self, keep: usize) -> Result<usize> {
        self.store
            .mutate(move |envelope| {
                if envelope.decisions.len() <= keep {
                    return 0;
                }
                envelope
                    .decisions
                    .sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                let pruned = envelope.decisions.len() - keep;
                envelope.decisions.truncate(keep);
                pruned
            })
            .await
    }

    /// Preload the store; returns how many decisions are cached.
    pub async fn warm_up(&self) -> Result<usize> {
        self.store.stats().await.map(|stats| stats.decisions)
    }

    /// Counters since the last reset.
    pub async fn stats(&self) -> CacheStats {
        *self.counters.lock().await
    }

    /// Reset the counters.
    pub async fn reset_stats(&self) {
        *self.counters.lock().await = CacheStats::default();
    }
}
