//! Thin wrapper over the `git` CLI.
//!
//! One function per subcommand; failures carry the operation name and the
//! command's stderr. Worktree-scoped operations take the directory they
//! run in, repository-scoped ones take the repository root.

use std::path::Path;
use std::process::{Command, Output};

use crate::error::{Error, Result};

fn run(dir: &Path, args: &[&str], operation: &str) -> Result<Output> {
    tracing::debug!("git {} (in {})", args.join(" "), dir.display());
    Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| Error::Spawn {
            operation: format!("git {operation}"),
            source: e,
        })
}

fn run_checked(dir: &Path, args: &[&str], operation: &str) -> Result<String> {
    let output = run(dir, args, operation)?;
    if !output.status.success() {
        return Err(Error::Git {
            operation: operation.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Whether `dir` is inside a git repository.
#[must_use]
pub fn is_repository(dir: &Path) -> bool {
    run(dir, &["rev-parse", "--git-dir"], "rev-parse")
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// The currently checked-out branch.
pub fn current_branch(dir: &Path) -> Result<String> {
    run_checked(dir, &["rev-parse", "--abbrev-ref", "HEAD"], "current branch")
        .map(|out| out.trim().to_string())
}

/// Check out a branch.
pub fn checkout(dir: &Path, branch: &str) -> Result<()> {
    run_checked(dir, &["checkout", branch], "checkout").map(|_| ())
}

/// Add a worktree at `path` on a new branch forked from `base`.
pub fn worktree_add(repo: &Path, path: &Path, branch: &str, base: &str) -> Result<()> {
    let path_str = path.to_string_lossy();
    run_checked(
        repo,
        &["worktree", "add", "-b", branch, path_str.as_ref(), base],
        "worktree add",
    )
    .map(|_| ())
}

/// Remove a worktree's working directory.
pub fn worktree_remove(repo: &Path, path: &Path, force: bool) -> Result<()> {
    let path_str = path.to_string_lossy();
    let mut args = vec!["worktree", "remove"];
    if force {
        args.push("--force");
    }
    args.push(path_str.as_ref());
    run_checked(repo, &args, "worktree remove").map(|_| ())
}

/// Prune stale worktree metadata.
pub fn worktree_prune(repo: &Path) -> Result<()> {
    run_checked(repo, &["worktree", "prune"], "worktree prune").map(|_| ())
}

/// Delete a branch. A branch that does not exist is not an error.
pub fn delete_branch(repo: &Path, branch: &str) -> Result<()> {
    match run_checked(repo, &["branch", "-D", branch], "branch delete") {
        Ok(_) => Ok(()),
        Err(Error::Git { stderr, .. }) if stderr.contains("not found") => Ok(()),
        Err(e) => Err(e),
    }
}

/// Whether the working tree has uncommitted changes.
pub fn has_uncommitted_changes(dir: &Path) -> Result<bool> {
    run_checked(dir, &["status", "--porcelain"], "status")
        .map(|out| !out.trim().is_empty())
}

fn merge_output_is_conflict(output: &Output) -> bool {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    stdout.contains("CONFLICT")
        || stderr.contains("CONFLICT")
        || stdout.contains("Automatic merge failed")
        || stderr.contains("Automatic merge failed")
}

/// Dry-run a merge: no commit, no fast-forward. Returns `true` when the
/// merge applies cleanly and `false` on content conflicts; the merge is
/// left in progress either way so callers can inspect and then commit or
/// abort.
pub fn merge_no_commit(repo: &Path, branch: &str) -> Result<bool> {
    let output = run(
        repo,
        &["merge", "--no-commit", "--no-ff", branch],
        "merge --no-commit",
    )?;
    if output.status.success() {
        return Ok(true);
    }
    if merge_output_is_conflict(&output) {
        return Ok(false);
    }
    Err(Error::Git {
        operation: "merge --no-commit".to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Merge `branch` into the current branch with a merge commit. Returns
/// `true` on clean merge, `false` when the merge stopped on conflicts.
pub fn merge(repo: &Path, branch: &str, message: &str) -> Result<bool> {
    let output = run(repo, &["merge", "--no-ff", "-m", message, branch], "merge")?;
    if output.status.success() {
        return Ok(true);
    }
    if merge_output_is_conflict(&output) {
        return Ok(false);
    }
    Err(Error::Git {
        operation: "merge".to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Abort an in-progress merge, restoring the pre-merge state.
pub fn merge_abort(repo: &Path) -> Result<()> {
    run_checked(repo, &["merge", "--abort"], "merge abort").map(|_| ())
}

/// Files left unmerged by an in-progress merge, sorted.
pub fn conflicted_files(repo: &Path) -> Result<Vec<String>> {
    let out = run_checked(
        repo,
        &["diff", "--name-only", "--diff-filter=U"],
        "list conflicts",
    )?;
    let mut files: Vec<String> = out
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect();
    files.sort();
    Ok(files)
}

/// Stage one path.
pub fn stage(dir: &Path, path: &str) -> Result<()> {
    run_checked(dir, &["add", "--", path], "stage").map(|_| ())
}

/// Create a commit with the given message.
pub fn commit(dir: &Path, message: &str) -> Result<()> {
    run_checked(dir, &["commit", "--no-verify", "-m", message], "commit").map(|_| ())
}

/// Whether `branch` is fully merged into `target`.
pub fn is_merged(repo: &Path, branch: &str, target: &str) -> Result<bool> {
    let out = run_checked(
        repo,
        &[
            "branch",
            "--merged",
            target,
            "--format=%(refname:short)",
        ],
        "branch --merged",
    )?;
    Ok(out.lines().any(|line| line.trim() == branch))
}

/// Whether a local branch exists.
#[must_use]
pub fn branch_exists(repo: &Path, branch: &str) -> bool {
    run(
        repo,
        &["rev-parse", "--verify", "--quiet", &format!("refs/heads/{branch}")],
        "rev-parse --verify",
    )
    .map(|output| output.status.success())
    .unwrap_or(false)
}
