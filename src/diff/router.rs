use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Span;
use crate::config::CacheConfig;
use crate::discovery::longest_first;
use crate::events::{is_git_operation, DiffEntry};
use crate::vcs::VcsBackend;
use super::engine::DiffEngine;
use super::RepoError;

/// Error text for a path that no known repository contains.
pub const NOT_IN_REPOSITORY: &str = "file not inside any known git repository";

/// One routed repository.
pub struct RepoEntry {
    root: PathBuf,
    name: String,
    engine: DiffEngine,
}

impl RepoEntry {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn engine(&self) -> &DiffEngine {
        &self.engine
    }
}

/// Routes paths to the diff engine of the repository that owns them.
///
/// Repositories are kept longest-root first, so a nested repository wins over
/// the one enclosing it.
pub struct RepoRouter {
    repos: Vec<RepoEntry>,
    span: Span,
}

impl RepoRouter {
    /// Opens an engine per `(root, display name)` pair.
    ///
    /// Roots that fail to open are skipped with a warning; it is an error only
    /// when none of them open.
    pub fn new<I>(repos: I, backend: Arc<dyn VcsBackend>, config: &CacheConfig) -> Result<Self, RepoError>
    where
        I: IntoIterator<Item = (PathBuf, String)>,
    {
        let mut requested = 0;
        let mut entries = Vec::new();

        for (root, name) in repos {
            requested += 1;
            match DiffEngine::new(root.clone(), Arc::clone(&backend), config) {
                Ok(engine) => entries.push(RepoEntry { root, name, engine }),
                Err(err) => tracing::warn!("Skipping repository {}: {}", root.display(), err),
            }
        }

        if entries.is_empty() {
            return Err(RepoError::NoValidRepositories { requested });
        }

        entries.sort_by(|a, b| longest_first(&a.root, &b.root));

        let span = tracing::info_span!("repo_router", repos = entries.len());
        Ok(Self { repos: entries, span })
    }

    /// The repository owning `path`, if any.
    pub fn route(&self, path: &Path) -> Option<&RepoEntry> {
        self.repos.iter().find(|repo| path.starts_with(&repo.root))
    }

    /// Classifies `path` with its owning repository's engine and tags the
    /// entry with that repository's display name.
    pub fn diff(&self, path: &Path) -> DiffEntry {
        if is_git_operation(path) {
            return DiffEntry::git_operation();
        }

        match self.route(path) {
            Some(repo) => {
                let mut entry = repo.engine.diff(path);
                entry.repo = repo.name.clone();
                entry
            }
            None => {
                let _enter = self.span.enter();
                tracing::debug!("No repository owns {}", path.display());
                DiffEntry::new(path.to_path_buf()).with_error(NOT_IN_REPOSITORY)
            }
        }
    }

    /// Dirty files of every repository, each tagged with its repository name.
    pub fn dirty_files(&self) -> Vec<DiffEntry> {
        self.repos
            .iter()
            .flat_map(|repo| {
                repo.engine.dirty_files().into_iter().map(move |mut entry| {
                    entry.repo = repo.name.clone();
                    entry
                })
            })
            .collect()
    }

    /// Roots in routing order (longest first).
    pub fn repo_roots(&self) -> Vec<PathBuf> {
        self.repos.iter().map(|repo| repo.root.clone()).collect()
    }

    pub fn repos(&self) -> &[RepoEntry] {
        &self.repos
    }

    pub fn clear_cache(&self) {
        for repo in &self.repos {
            repo.engine.clear_cache();
        }
    }
}
