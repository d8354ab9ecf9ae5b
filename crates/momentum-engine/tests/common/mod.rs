//! Shared scratch-repository fixtures for engine integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

/// Run a git command in `dir`, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap_or_else(|e| panic!("failed to run git {args:?}: {e}"));
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Capture a git command's stdout in `dir`, panicking on failure.
pub fn git_stdout(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap_or_else(|e| panic!("failed to run git {args:?}: {e}"));
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Initialize a scratch repository on branch `main` with one commit.
pub fn init_repo() -> (tempfile::TempDir, PathBuf) {
    let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
    let repo = tmp.path().to_path_buf();
    git(&repo, &["init", "-b", "main"]);
    git(&repo, &["config", "user.email", "engine@example.com"]);
    git(&repo, &["config", "user.name", "Engine Tests"]);
    git(&repo, &["config", "commit.gpgsign", "false"]);
    std::fs::write(repo.join("README.md"), "# scratch\n")
        .unwrap_or_else(|e| panic!("write failed: {e}"));
    git(&repo, &["add", "."]);
    git(&repo, &["commit", "-m", "initial commit"]);
    (tmp, repo)
}

/// Write a file and commit it in `dir`.
pub fn write_and_commit(dir: &Path, file: &str, content: &str, message: &str) {
    let path = dir.join(file);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap_or_else(|e| panic!("mkdir failed: {e}"));
    }
    std::fs::write(&path, content).unwrap_or_else(|e| panic!("write failed: {e}"));
    git(dir, &["add", "."]);
    git(dir, &["commit", "-m", message]);
}

/// Whether a local branch exists in the repository.
pub fn branch_exists(repo: &Path, branch: &str) -> bool {
    Command::new("git")
        .args(["rev-parse", "--verify", "--quiet", &format!("refs/heads/{branch}")])
        .current_dir(repo)
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}
