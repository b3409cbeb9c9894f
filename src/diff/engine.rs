use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Span;
use crate::config::CacheConfig;
use crate::events::{is_git_operation, DiffEntry};
use crate::filter::is_transient_artifact;
use crate::vcs::VcsBackend;
use super::cache::DiffCache;
use super::RepoError;

/// Classifies and caches the diff state of files in a single repository.
pub struct DiffEngine {
    root: PathBuf,
    backend: Arc<dyn VcsBackend>,
    cache: DiffCache,
    span: Span,
}

impl DiffEngine {
    /// Opens an engine for `root`, failing if the backend does not recognise it
    /// as a repository.
    pub fn new<P: Into<PathBuf>>(
        root: P,
        backend: Arc<dyn VcsBackend>,
        config: &CacheConfig,
    ) -> Result<Self, RepoError> {
        let root = root.into();
        if !backend.is_repo(&root) {
            return Err(RepoError::NotARepository(root));
        }

        let span = tracing::debug_span!("diff_engine", root = %root.display());
        Ok(Self {
            cache: DiffCache::new(config.capacity, config.freshness()),
            root,
            backend,
            span,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache(&self) -> &DiffCache {
        &self.cache
    }

    /// Current branch of this repository, if git can name one.
    pub fn branch(&self) -> Option<String> {
        self.backend.current_branch(&self.root)
    }

    /// Classifies `path`. Never fails: backend errors end up in `DiffEntry::error`.
    ///
    /// An entry with an empty diff, no error and `is_new == false` means the
    /// file matches its committed state.
    pub fn diff(&self, path: &Path) -> DiffEntry {
        if is_git_operation(path) {
            return DiffEntry::git_operation();
        }

        let _enter = self.span.enter();
        let mut entry = DiffEntry::new(path.to_path_buf());

        if let Some(cached) = self.cache.get_fresh(path) {
            tracing::trace!("Cache hit for {}", path.display());
            entry.diff = cached.diff;
            entry.error = cached.error;
            entry.is_new = cached.is_new;
        } else {
            self.classify(&mut entry);
            self.cache.insert(path, &entry);
        }

        entry.is_deleted = !path.exists();
        entry
    }

    fn classify(&self, entry: &mut DiffEntry) {
        let path = entry.file_path.clone();
        let rel = path.strip_prefix(&self.root).unwrap_or(&path);

        match self.backend.diff_worktree(&self.root, rel) {
            Ok(diff) if !diff.is_empty() => {
                entry.diff = diff;
                return;
            }
            Ok(_) => {}
            Err(err) => {
                tracing::debug!("Working tree diff failed for {}: {}", path.display(), err);
                entry.error = err.to_string();
                return;
            }
        }

        match self.backend.diff_staged(&self.root, rel) {
            Ok(diff) if !diff.is_empty() => {
                entry.diff = diff;
                return;
            }
            Ok(_) => {}
            Err(err) => {
                tracing::debug!("Staged diff failed for {}: {}", path.display(), err);
                entry.error = err.to_string();
                return;
            }
        }

        if self.backend.is_tracked(&self.root, rel) {
            tracing::debug!("File committed/clean: {}", path.display());
            return;
        }

        // An untracked file that is already gone has nothing left to show.
        if !path.exists() {
            return;
        }

        match self.backend.diff_untracked(&self.root, &path) {
            Ok(diff) => {
                entry.diff = diff;
                entry.is_new = true;
            }
            Err(err) => {
                tracing::debug!("Untracked diff failed for {}: {}", path.display(), err);
                entry.error = err.to_string();
            }
        }
    }

    /// Entries for every file with uncommitted changes: modified, staged or untracked.
    ///
    /// A listing that fails is logged and contributes nothing; files that turn
    /// out to be clean are left out.
    pub fn dirty_files(&self) -> Vec<DiffEntry> {
        let _enter = self.span.enter();

        let listings = [
            ("modified", self.backend.changed_files(&self.root)),
            ("staged", self.backend.staged_files(&self.root)),
            ("untracked", self.backend.untracked_files(&self.root)),
        ];

        let mut seen = HashSet::new();
        let mut rel_paths = Vec::new();
        for (kind, listing) in listings {
            match listing {
                Ok(names) => {
                    for name in names {
                        if seen.insert(name.clone()) {
                            rel_paths.push(name);
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!("Failed to list {} files in {}: {}", kind, self.root.display(), err);
                }
            }
        }

        rel_paths
            .into_iter()
            .filter(|rel| !is_transient_artifact(rel))
            .map(|rel| self.diff(&self.root.join(rel)))
            .filter(|entry| !entry.diff.is_empty() || entry.is_new)
            .collect()
    }

    /// Forgets every cached result, e.g. after a commit or reset.
    pub fn clear_cache(&self) {
        let _enter = self.span.enter();
        tracing::debug!("Clearing diff cache ({} entries)", self.cache.len());
        self.cache.clear();
    }
}
