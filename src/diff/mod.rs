//! Diff classification
//!
//! [`DiffEngine`] classifies files of one repository with the help of a
//! [`VcsBackend`] and a short-lived cache. [`RepoRouter`] fans paths out to the
//! engine of their innermost repository. [`DiffSource`] is what consumers hold:
//! one of the two, chosen when the watched directory is opened.

pub mod cache;
pub mod engine;
pub mod router;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use crate::config::CacheConfig;
use crate::discovery::{discover_repos, repo_name};
use crate::events::DiffEntry;
use crate::vcs::VcsBackend;

pub use cache::{CachedDiff, DiffCache};
pub use engine::DiffEngine;
pub use router::{RepoEntry, RepoRouter, NOT_IN_REPOSITORY};

/// Failures while opening repositories. These only happen at startup.
#[derive(Error, Debug)]
pub enum RepoError {
    #[error("not a git repository: {}", .0.display())]
    NotARepository(PathBuf),

    #[error("{} is not a git repository and contains no git repositories", .0.display())]
    NoRepositories(PathBuf),

    #[error("no valid git repositories found ({requested} candidates could not be opened)")]
    NoValidRepositories { requested: usize },

    #[error("failed to scan {} for repositories: {source}", path.display())]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The diff provider for a watched directory: a single repository, or every
/// repository discovered beneath a parent directory.
pub enum DiffSource {
    Single(DiffEngine),
    Multi(RepoRouter),
}

impl DiffSource {
    /// Opens `dir` as a single repository if it is one; otherwise discovers the
    /// repositories under it.
    pub fn open<P: AsRef<Path>>(
        dir: P,
        backend: Arc<dyn VcsBackend>,
        config: &CacheConfig,
    ) -> Result<Self, RepoError> {
        let dir = dir.as_ref();

        if backend.is_repo(dir) {
            tracing::info!("Single-repo mode: {}", dir.display());
            return Ok(Self::Single(DiffEngine::new(dir, backend, config)?));
        }

        let repos = discover_repos(dir)?;
        if repos.is_empty() {
            return Err(RepoError::NoRepositories(dir.to_path_buf()));
        }

        tracing::info!("Multi-repo mode: {} repositories under {}", repos.len(), dir.display());
        Ok(Self::Multi(RepoRouter::new(repos, backend, config)?))
    }

    pub fn diff(&self, path: &Path) -> DiffEntry {
        match self {
            Self::Single(engine) => engine.diff(path),
            Self::Multi(router) => router.diff(path),
        }
    }

    pub fn dirty_files(&self) -> Vec<DiffEntry> {
        match self {
            Self::Single(engine) => engine.dirty_files(),
            Self::Multi(router) => router.dirty_files(),
        }
    }

    pub fn clear_cache(&self) {
        match self {
            Self::Single(engine) => engine.clear_cache(),
            Self::Multi(router) => router.clear_cache(),
        }
    }

    /// Repository roots, longest first.
    pub fn repo_roots(&self) -> Vec<PathBuf> {
        match self {
            Self::Single(engine) => vec![engine.root().to_path_buf()],
            Self::Multi(router) => router.repo_roots(),
        }
    }

    /// `(display name, root, branch)` for every repository.
    pub fn repositories(&self) -> Vec<(String, PathBuf, Option<String>)> {
        match self {
            Self::Single(engine) => vec![(
                repo_name(engine.root()),
                engine.root().to_path_buf(),
                engine.branch(),
            )],
            Self::Multi(router) => router
                .repos()
                .iter()
                .map(|repo| {
                    (
                        repo.name().to_string(),
                        repo.root().to_path_buf(),
                        repo.engine().branch(),
                    )
                })
                .collect(),
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, Self::Multi(_))
    }
}
