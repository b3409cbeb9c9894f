//! Locating git repositories on disk.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use ignore::WalkBuilder;
use crate::diff::RepoError;

/// Name of the version-control metadata directory.
pub const GIT_DIR: &str = ".git";

/// Walks `parent` and returns every repository root beneath it (including
/// `parent` itself) mapped to its display name, the directory's basename.
///
/// The walk never enters a `.git` directory and stops descending at each
/// repository it finds, so repositories nested inside another one are not
/// reported separately.
pub fn discover_repos<P: AsRef<Path>>(parent: P) -> Result<BTreeMap<PathBuf, String>, RepoError> {
    let parent = parent.as_ref();
    if !parent.is_dir() {
        return Err(RepoError::Discovery {
            path: parent.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        });
    }

    let mut repos = BTreeMap::new();

    let walker = WalkBuilder::new(parent)
        .standard_filters(false)
        .follow_links(false)
        .filter_entry(|entry| {
            if !entry.file_type().map_or(false, |t| t.is_dir()) {
                return false;
            }
            if entry.file_name() == GIT_DIR {
                return false;
            }
            // Children of a repository root belong to that repository.
            match entry.path().parent() {
                Some(dir) if entry.depth() > 0 => !is_repo_root(dir),
                _ => true,
            }
        })
        .build();

    for result in walker {
        match result {
            Ok(entry) => {
                let path = entry.path();
                if entry.file_type().map_or(false, |t| t.is_dir()) && is_repo_root(path) {
                    repos.insert(path.to_path_buf(), repo_name(path));
                }
            }
            Err(err) => {
                tracing::debug!("Skipping unreadable entry during discovery: {}", err);
            }
        }
    }

    tracing::debug!("Discovered {} repositories under {}", repos.len(), parent.display());
    Ok(repos)
}

/// Whether `dir` directly contains a `.git` entry (directory, or file for worktrees).
pub fn is_repo_root<P: AsRef<Path>>(dir: P) -> bool {
    dir.as_ref().join(GIT_DIR).exists()
}

/// Display name for a repository root.
pub fn repo_name<P: AsRef<Path>>(root: P) -> String {
    root.as_ref()
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.as_ref().display().to_string())
}

/// Orders roots longest first, ties broken by path.
pub fn longest_first(a: &Path, b: &Path) -> Ordering {
    let (a_len, b_len) = (a.as_os_str().len(), b.as_os_str().len());
    b_len.cmp(&a_len).then_with(|| a.cmp(b))
}

/// Sorts roots so the deepest (longest) comes first.
///
/// Prefix matching over the sorted list then picks the innermost repository.
pub fn sort_longest_first(roots: &mut [PathBuf]) {
    roots.sort_by(|a, b| longest_first(a, b));
}

/// Returns the first root in `roots` that contains `path` (or equals it).
///
/// `roots` must be ordered by [`sort_longest_first`].
pub fn find_repo_root<'a>(path: &Path, roots: &'a [PathBuf]) -> Option<&'a Path> {
    roots
        .iter()
        .find(|root| path.starts_with(root))
        .map(PathBuf::as_path)
}
