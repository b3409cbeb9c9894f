//! Version-control backend abstraction
//!
//! The pipeline never computes diffs itself. Every question about repository
//! state goes through [`VcsBackend`], which `GitCli` answers by running the
//! `git` executable.

pub mod git;

#[cfg(test)]
pub(crate) mod mock;

use std::path::Path;
use thiserror::Error;

pub use git::GitCli;

/// Failure of a single backend query.
#[derive(Error, Debug)]
pub enum VcsError {
    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("git {command} failed ({status}): {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Queries the pipeline needs from a version-control system.
///
/// `root` is the directory the caller opened: a work-tree root or any
/// directory inside one. `rel` paths and listed names are relative to it;
/// `abs` paths are absolute.
pub trait VcsBackend: Send + Sync {
    /// Whether `dir` is a repository (or lies inside one).
    fn is_repo(&self, dir: &Path) -> bool;

    /// Unified diff of the working tree against the last commit.
    fn diff_worktree(&self, root: &Path, rel: &Path) -> Result<String, VcsError>;

    /// Unified diff of the index against the last commit.
    fn diff_staged(&self, root: &Path, rel: &Path) -> Result<String, VcsError>;

    /// Unified diff of `abs` against an empty input, showing every line as added.
    fn diff_untracked(&self, root: &Path, abs: &Path) -> Result<String, VcsError>;

    fn is_tracked(&self, root: &Path, rel: &Path) -> bool;

    /// Paths with unstaged modifications, relative to `root`.
    fn changed_files(&self, root: &Path) -> Result<Vec<String>, VcsError>;

    /// Paths with staged modifications, relative to `root`.
    fn staged_files(&self, root: &Path) -> Result<Vec<String>, VcsError>;

    /// Untracked, non-ignored paths, relative to `root`.
    fn untracked_files(&self, root: &Path) -> Result<Vec<String>, VcsError>;

    fn current_branch(&self, root: &Path) -> Option<String>;

    /// Whether the repository's ignore rules exclude `abs`.
    fn is_ignored(&self, root: &Path, abs: &Path) -> bool;
}
