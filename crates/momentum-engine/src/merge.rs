//! Conflict detection and AI-assisted resolution.
//!
//! Three tiers, tried in order of increasing intervention: the plain merge
//! (tier 1), conflict analysis (tier 2), and AI resolution of the parsed
//! hunks through an injected [`ResolutionProvider`] (tier 3). A fourth
//! full-file tier is tracked in statistics but not implemented.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use momentum_core::conflict::{analyze_file, summarize, ConflictAnalysis, ConflictDocument};
use momentum_core::resolution::{
    append_failure, build_resolution_prompt, validate_resolution, Language, PromptContext,
    Resolution,
};

use crate::error::{Error, Result};
use crate::git;

/// The injected AI capability for conflict resolution.
///
/// The engine never depends on a particular model; callers supply a
/// function from prompt to [`Resolution`].
#[async_trait]
pub trait ResolutionProvider: Send + Sync {
    /// Produce a resolution for the given prompt.
    async fn resolve(&self, prompt: &str) -> Result<Resolution>;
}

/// Resolution statistics, accumulated across merges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionStats {
    /// Files a resolution was attempted for.
    pub attempted: u64,
    /// Files resolved and applied.
    pub successful: u64,
    /// Files that exhausted retries or hit provider errors.
    pub failed: u64,
    /// Validation rejections, including ones that were retried.
    pub validation_errors: u64,
    /// Retry attempts made.
    pub retries: u64,
}

impl ResolutionStats {
    /// Fold another stats block into this one.
    pub fn absorb(&mut self, other: Self) {
        self.attempted += other.attempted;
        self.successful += other.successful;
        self.failed += other.failed;
        self.validation_errors += other.validation_errors;
        self.retries += other.retries;
    }
}

/// Detects and characterizes conflicts for a prospective merge without
/// leaving side effects.
#[derive(Debug, Clone, Copy)]
pub struct ConflictDetector {
    context_width: usize,
}

impl ConflictDetector {
    /// Create a detector capturing context slices of the given width.
    #[must_use]
    pub const fn new(context_width: usize) -> Self {
        Self { context_width }
    }

    /// Dry-run a merge of `branch` into `target` and analyze the fallout.
    ///
    /// The repository is restored to its pre-merge state before returning.
    pub fn detect(&self, repo: &Path, branch: &str, target: &str) -> Result<ConflictAnalysis> {
        git::checkout(repo, target)?;

        if git::merge_no_commit(repo, branch)? {
            // Clean: abort the staged merge. "Already up to date" merges
            // leave nothing in progress, so a failed abort is fine here.
            if let Err(e) = git::merge_abort(repo) {
                tracing::debug!("no merge to abort after clean dry-run: {e}");
            }
            return Ok(ConflictAnalysis::clean());
        }

        let analysis = analyze_in_progress_merge(repo, self.context_width);
        git::merge_abort(repo)?;
        analysis
    }
}

/// Analyze the conflicted files of a merge that is currently in progress.
pub(crate) fn analyze_in_progress_merge(
    repo: &Path,
    context_width: usize,
) -> Result<ConflictAnalysis> {
    let files = git::conflicted_files(repo)?;
    let mut analyses = Vec::with_capacity(files.len());
    for file in &files {
        let content = std::fs::read_to_string(repo.join(file))?;
        let doc = ConflictDocument::parse(&content).map_err(Error::Core)?;
        let hunks = doc.hunks(context_width);
        analyses.push(analyze_file(file, &hunks));
    }
    let summary = summarize(&analyses);
    Ok(ConflictAnalysis {
        has_conflicts: true,
        files: analyses,
        summary: Some(summary),
    })
}

/// Applies AI resolutions to conflicted files with validation and retry.
pub struct ConflictResolver<'a> {
    provider: &'a dyn ResolutionProvider,
    max_retries: u32,
    context_width: usize,
    stats: ResolutionStats,
}

impl<'a> ConflictResolver<'a> {
    /// Create a resolver with the given retry cap.
    #[must_use]
    pub fn new(provider: &'a dyn ResolutionProvider, max_retries: u32, context_width: usize) -> Self {
        Self {
            provider,
            max_retries,
            context_width,
            stats: ResolutionStats::default(),
        }
    }

    /// Statistics accumulated so far.
    #[must_use]
    pub const fn stats(&self) -> ResolutionStats {
        self.stats
    }

    /// Resolve one conflicted file in place and stage it.
    ///
    /// On validation failure the provider is re-prompted with the prior
    /// error appended, up to the retry cap.
    ///
    /// # Errors
    ///
    /// - `Error::ResolutionFailed` when retries are exhausted.
    /// - Provider and filesystem errors propagate.
    pub async fn resolve_file(
        &mut self,
        repo: &Path,
        file: &str,
        context: &PromptContext,
    ) -> Result<Resolution> {
        let path = repo.join(file);
        let content = tokio::fs::read_to_string(&path).await?;
        let doc = ConflictDocument::parse(&content).map_err(Error::Core)?;
        let hunks = doc.hunks(self.context_width);
        let language = Language::from_path(file);

        self.stats.attempted += 1;
        let mut prompt = build_resolution_prompt(file, language, &hunks, context);
        let mut retries = 0u32;

        loop {
            let resolution = match self.provider.resolve(&prompt).await {
                Ok(resolution) => resolution,
                Err(e) => {
                    self.stats.failed += 1;
                    return Err(e);
                }
            };

            match validate_resolution(&resolution.content, &hunks, language) {
                Ok(()) => {
                    let updated = doc.apply_resolution(&resolution.content);
                    tokio::fs::write(&path, updated).await?;
                    git::stage(repo, file)?;
                    self.stats.successful += 1;
                    tracing::debug!(
                        "resolved '{file}' with confidence {} after {retries} retries",
                        resolution.confidence
                    );
                    return Ok(resolution);
                }
                Err(validation) => {
                    self.stats.validation_errors += 1;
                    if !validation.retryable || retries >= self.max_retries {
                        self.stats.failed += 1;
                        return Err(Error::ResolutionFailed {
                            file: file.to_string(),
                            reason: validation.to_string(),
                        });
                    }
                    retries += 1;
                    self.stats.retries += 1;
                    prompt = append_failure(&prompt, &validation.message);
                    tracing::debug!("retrying '{file}' after rejection: {validation}");
                }
            }
        }
    }
}
