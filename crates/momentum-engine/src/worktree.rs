//! Per-task worktree lifecycle and merge-back orchestration.
//!
//! The manager owns `<repo>/.worktrees/`. Every operation is serialized
//! per worktree name; merges additionally hold the repository-wide merge
//! lock, because git metadata at the repository level is a shared
//! resource.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use momentum_core::conflict::ConflictAnalysis;
use momentum_core::resolution::PromptContext;
use momentum_core::{QaResult, WorktreeName};

use crate::config::MergeOptions;
use crate::error::{Error, Result};
use crate::git;
use crate::merge::{
    analyze_in_progress_merge, ConflictResolver, ResolutionProvider, ResolutionStats,
};

/// Directory under the repository root that holds all worktrees.
pub const WORKTREES_DIR: &str = ".worktrees";

/// A live worktree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worktree {
    /// Logical name; the branch is derived from it.
    pub name: WorktreeName,
    /// Working directory under `.worktrees/`.
    pub path: PathBuf,
    /// Branch label, always `worktree/<name>`.
    pub branch: String,
    /// Branch the worktree forked from.
    pub base_branch: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Aggregate merge counters.
///
/// Identity: `total_merges = auto_resolved + ai_resolved + manual_required
/// + failed`. The `ai_full_file` tier is reserved and stays zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    /// Merges attempted.
    pub total_merges: u64,
    /// Clean tier-1 merges.
    pub auto_resolved: u64,
    /// Merges completed through AI conflict resolution.
    pub ai_resolved: u64,
    /// Reserved for the full-file resolution tier.
    pub ai_full_file: u64,
    /// Merges queued for manual resolution (including partials).
    pub manual_required: u64,
    /// Merges that errored while applying.
    pub failed: u64,
}

/// One entry in the manual-resolution queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedConflict {
    /// Worktree whose merge could not complete.
    pub worktree: String,
    /// Files awaiting manual resolution.
    pub files: Vec<String>,
    /// The analysis captured at queue time.
    pub analysis: ConflictAnalysis,
    /// When the entry was queued.
    pub timestamp: DateTime<Utc>,
}

/// Which tier completed a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// The plain merge applied cleanly.
    Auto,
    /// Conflicts were AI-resolved and the merge committed.
    AiAssisted,
}

/// Outcome of one merge request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MergeOutcome {
    /// The merge committed; the worktree was deleted.
    Merged {
        /// Which tier succeeded.
        strategy: MergeStrategy,
        /// Files that needed AI resolution.
        resolved_files: Vec<String>,
    },
    /// Some files resolved, the rest queued; the merge was aborted.
    Partial {
        /// Files that validated and applied before the abort.
        resolved: Vec<String>,
        /// Files queued for manual resolution.
        queued: Vec<String>,
    },
    /// No provider was available (or nothing resolved); queued.
    ManualRequired {
        /// Files queued for manual resolution.
        queued: Vec<String>,
    },
    /// Preview-only analysis; no side effects.
    Preview {
        /// The conflict analysis.
        analysis: ConflictAnalysis,
    },
}

/// Owns the `.worktrees/` area and the merge-back flow.
pub struct WorktreeManager {
    repo: PathBuf,
    root: PathBuf,
    registry: Mutex<BTreeMap<String, Worktree>>,
    name_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    // git metadata at the repository level is a shared resource: worktree
    // add/remove and merges must not interleave.
    git_lock: Mutex<()>,
    merge_lock: Mutex<()>,
    stats: Mutex<MergeStats>,
    resolution_stats: Mutex<ResolutionStats>,
    conflict_queue: Mutex<Vec<QueuedConflict>>,
}

impl WorktreeManager {
    /// Initialize the manager: verify the repository, ensure the
    /// `.worktrees/` directory and its gitignore entry, and adopt any
    /// worktrees left over from a previous run.
    pub async fn initialize(repo: impl Into<PathBuf>) -> Result<Arc<Self>> {
        let repo = repo.into();
        if !git::is_repository(&repo) {
            return Err(Error::Precondition(format!(
                "'{}' is not a git repository",
                repo.display()
            )));
        }

        let root = repo.join(WORKTREES_DIR);
        tokio::fs::create_dir_all(&root).await?;
        ensure_gitignore(&repo).await?;

        let manager = Self {
            repo: repo.clone(),
            root,
            registry: Mutex::new(BTreeMap::new()),
            name_locks: Mutex::new(HashMap::new()),
            git_lock: Mutex::new(()),
            merge_lock: Mutex::new(()),
            stats: Mutex::new(MergeStats::default()),
            resolution_stats: Mutex::new(ResolutionStats::default()),
            conflict_queue: Mutex::new(Vec::new()),
        };
        manager.adopt_existing().await?;
        Ok(Arc::new(manager))
    }

    /// The repository root this manager operates on.
    #[must_use]
    pub fn repo(&self) -> &Path {
        &self.repo
    }

    async fn adopt_existing(&self) -> Result<()> {
        let base = git::current_branch(&self.repo).unwrap_or_else(|_| "main".to_string());
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut registry = self.registry.lock().await;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let worktree_name = WorktreeName::new(name.clone());
            tracing::info!("adopting existing worktree '{name}'");
            registry.insert(
                name,
                Worktree {
                    branch: worktree_name.branch(),
                    name: worktree_name,
                    path: entry.path(),
                    base_branch: base.clone(),
                    created_at: Utc::now(),
                },
            );
        }
        Ok(())
    }

    async fn name_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.name_locks.lock().await;
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Create a worktree for `name` forked from `base`.
    ///
    /// # Errors
    ///
    /// `Error::Precondition` when a worktree with that name already
    /// exists; git errors propagate.
    pub async fn create(&self, name: &WorktreeName, base: &str) -> Result<Worktree> {
        let lock = self.name_lock(name.as_str()).await;
        let _guard = lock.lock().await;

        {
            let registry = self.registry.lock().await;
            if registry.contains_key(name.as_str()) {
                return Err(Error::Precondition(format!(
                    "worktree '{name}' already exists"
                )));
            }
        }

        let path = self.root.join(name.as_str());
        if path.exists() {
            return Err(Error::Precondition(format!(
                "worktree directory '{}' already exists",
                path.display()
            )));
        }

        let branch = name.branch();
        {
            let _git = self.git_lock.lock().await;
            git::worktree_add(&self.repo, &path, &branch, base)?;
        }

        let worktree = Worktree {
            name: name.clone(),
            path,
            branch,
            base_branch: base.to_string(),
            created_at: Utc::now(),
        };
        self.registry
            .lock()
            .await
            .insert(name.as_str().to_string(), worktree.clone());
        tracing::info!("created worktree '{name}' on {}", worktree.branch);
        Ok(worktree)
    }

    /// All live worktrees, sorted by name.
    pub async fn list(&self) -> Vec<Worktree> {
        self.registry.lock().await.values().cloned().collect()
    }

    /// Look up one worktree.
    pub async fn get(&self, name: &WorktreeName) -> Option<Worktree> {
        self.registry.lock().await.get(name.as_str()).cloned()
    }

    /// Delete a worktree: working directory and branch.
    ///
    /// A missing branch is ignored; a missing directory is an error.
    pub async fn delete(&self, name: &WorktreeName, force: bool) -> Result<()> {
        let lock = self.name_lock(name.as_str()).await;
        let _guard = lock.lock().await;
        self.delete_locked(name, force).await
    }

    async fn delete_locked(&self, name: &WorktreeName, force: bool) -> Result<()> {
        let worktree = self
            .get(name)
            .await
            .ok_or_else(|| Error::NotFound(format!("worktree '{name}'")))?;

        if !worktree.path.exists() {
            return Err(Error::NotFound(format!(
                "worktree directory '{}'",
                worktree.path.display()
            )));
        }

        {
            let _git = self.git_lock.lock().await;
            git::worktree_remove(&self.repo, &worktree.path, force)?;
            git::delete_branch(&self.repo, &worktree.branch)?;
        }
        self.registry.lock().await.remove(name.as_str());
        tracing::info!("deleted worktree '{name}'");
        Ok(())
    }

    /// Remove worktrees already merged into `target` and prune stale
    /// metadata. Returns the removed names.
    pub async fn clean(&self, target: &str) -> Result<Vec<String>> {
        let worktrees = self.list().await;
        let mut removed = Vec::new();

        for worktree in worktrees {
            let lock = self.name_lock(worktree.name.as_str()).await;
            let _guard = lock.lock().await;

            if !worktree.path.exists() {
                // Stale registration: the directory vanished out of band.
                self.registry.lock().await.remove(worktree.name.as_str());
                git::delete_branch(&self.repo, &worktree.branch)?;
                removed.push(worktree.name.as_str().to_string());
                continue;
            }

            if git::is_merged(&self.repo, &worktree.branch, target)? {
                self.delete_locked(&worktree.name, true).await?;
                removed.push(worktree.name.as_str().to_string());
            }
        }

        git::worktree_prune(&self.repo)?;
        Ok(removed)
    }

    /// Abort the repository's in-progress merge, if any.
    pub async fn rollback_merge(&self) -> Result<()> {
        let _guard = self.merge_lock.lock().await;
        git::merge_abort(&self.repo)
    }

    /// Aggregate merge counters.
    pub async fn stats(&self) -> MergeStats {
        *self.stats.lock().await
    }

    /// Aggregate resolution counters.
    pub async fn resolution_stats(&self) -> ResolutionStats {
        *self.resolution_stats.lock().await
    }

    /// The manual-resolution queue, oldest first.
    pub async fn conflict_queue(&self) -> Vec<QueuedConflict> {
        self.conflict_queue.lock().await.clone()
    }

    /// Remove and return the whole queue.
    pub async fn drain_conflict_queue(&self) -> Vec<QueuedConflict> {
        std::mem::take(&mut *self.conflict_queue.lock().await)
    }

    /// Empty the queue.
    pub async fn clear_conflict_queue(&self) {
        self.conflict_queue.lock().await.clear();
    }

    /// Merge a worktree back into the target branch.
    ///
    /// Refuses on uncommitted changes and, when `require_qa` is set, on
    /// missing or failed QA. With `preview` set, returns the conflict
    /// analysis without side effects.
    pub async fn merge(
        &self,
        name: &WorktreeName,
        options: &MergeOptions,
        qa: Option<&QaResult>,
        provider: Option<&dyn ResolutionProvider>,
    ) -> Result<MergeOutcome> {
        let lock = self.name_lock(name.as_str()).await;
        let _name_guard = lock.lock().await;
        let _merge_guard = self.merge_lock.lock().await;

        let worktree = self
            .get(name)
            .await
            .ok_or_else(|| Error::NotFound(format!("worktree '{name}'")))?;

        if git::has_uncommitted_changes(&worktree.path)? {
            return Err(Error::Precondition(format!(
                "worktree '{name}' has uncommitted changes"
            )));
        }

        if options.require_qa && !qa.is_some_and(|result| result.passed) {
            return Err(Error::Precondition(format!(
                "worktree '{name}' has not passed QA"
            )));
        }

        if options.preview {
            let detector = crate::merge::ConflictDetector::new(options.context_width);
            let analysis =
                detector.detect(&self.repo, &worktree.branch, &options.target_branch)?;
            return Ok(MergeOutcome::Preview { analysis });
        }

        git::checkout(&self.repo, &options.target_branch)?;
        let message = format!("Merge {} into {}", worktree.branch, options.target_branch);

        // Tier 1: plain merge.
        if git::merge(&self.repo, &worktree.branch, &message)? {
            self.bump(|stats| {
                stats.total_merges += 1;
                stats.auto_resolved += 1;
            })
            .await;
            self.delete_locked(name, true).await?;
            return Ok(MergeOutcome::Merged {
                strategy: MergeStrategy::Auto,
                resolved_files: Vec::new(),
            });
        }

        // Tier 2: the merge stopped on conflicts; analyze them in place.
        let analysis = analyze_in_progress_merge(&self.repo, options.context_width)?;
        let files: Vec<String> = analysis.files.iter().map(|f| f.path.clone()).collect();

        let Some(provider) = provider else {
            git::merge_abort(&self.repo)?;
            self.queue_conflict(name, files.clone(), analysis).await;
            self.bump(|stats| {
                stats.total_merges += 1;
                stats.manual_required += 1;
            })
            .await;
            return Ok(MergeOutcome::ManualRequired { queued: files });
        };

        // Tier 3: AI resolution, file by file.
        let context = PromptContext {
            commit_context: options
                .commit_context
                .clone()
                .or_else(|| Some(message.clone())),
            project_conventions: options.project_conventions.clone(),
        };
        let mut resolver = ConflictResolver::new(
            provider,
            options.max_resolution_retries,
            options.context_width,
        );
        let mut resolved = Vec::new();
        let mut unresolved = Vec::new();

        for file in &files {
            match resolver.resolve_file(&self.repo, file, &context).await {
                Ok(_) => resolved.push(file.clone()),
                Err(e) => {
                    tracing::warn!("resolution failed for '{file}': {e}");
                    unresolved.push(file.clone());
                }
            }
        }
        self.resolution_stats.lock().await.absorb(resolver.stats());

        if unresolved.is_empty() {
            if let Err(e) = git::commit(&self.repo, &message) {
                let _ = git::merge_abort(&self.repo);
                self.bump(|stats| {
                    stats.total_merges += 1;
                    stats.failed += 1;
                })
                .await;
                return Err(e);
            }
            self.bump(|stats| {
                stats.total_merges += 1;
                stats.ai_resolved += 1;
            })
            .await;
            self.delete_locked(name, true).await?;
            return Ok(MergeOutcome::Merged {
                strategy: MergeStrategy::AiAssisted,
                resolved_files: resolved,
            });
        }

        // Some files could not be resolved: abort and queue the rest.
        git::merge_abort(&self.repo)?;
        self.queue_conflict(name, unresolved.clone(), analysis).await;
        self.bump(|stats| {
            stats.total_merges += 1;
            stats.manual_required += 1;
        })
        .await;

        if resolved.is_empty() {
            Ok(MergeOutcome::ManualRequired { queued: unresolved })
        } else {
            Ok(MergeOutcome::Partial {
                resolved,
                queued: unresolved,
            })
        }
    }

    async fn queue_conflict(
        &self,
        name: &WorktreeName,
        files: Vec<String>,
        analysis: ConflictAnalysis,
    ) {
        self.conflict_queue.lock().await.push(QueuedConflict {
            worktree: name.as_str().to_string(),
            files,
            analysis,
            timestamp: Utc::now(),
        });
    }

    async fn bump(&self, update: impl FnOnce(&mut MergeStats)) {
        update(&mut *self.stats.lock().await);
    }
}

async fn ensure_gitignore(repo: &Path) -> Result<()> {
    let path = repo.join(".gitignore");
    let entry = format!("{WORKTREES_DIR}/");
    let existing = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    if existing.lines().any(|line| line.trim() == entry) {
        return Ok(());
    }
    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(&entry);
    updated.push('\n');
    tokio::fs::write(&path, updated).await?;
    Ok(())
}
