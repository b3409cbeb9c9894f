//! In-memory backend for unit tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use super::{VcsBackend, VcsError};

#[derive(Default)]
struct State {
    repos: HashSet<PathBuf>,
    worktree: HashMap<PathBuf, Result<String, String>>,
    staged: HashMap<PathBuf, Result<String, String>>,
    tracked: HashSet<PathBuf>,
    ignored: HashSet<PathBuf>,
    changed: HashMap<PathBuf, Vec<String>>,
    staged_names: HashMap<PathBuf, Vec<String>>,
    untracked: HashMap<PathBuf, Vec<String>>,
    failing_listings: HashSet<PathBuf>,
}

/// Backend whose answers are set up by the test and whose calls are counted.
///
/// Diffs are keyed by `root.join(rel)`.
#[derive(Default)]
pub(crate) struct MockBackend {
    state: Mutex<State>,
    diff_calls: AtomicUsize,
    ignore_calls: AtomicUsize,
}

fn command_error(message: &str) -> VcsError {
    VcsError::Command {
        command: "diff".to_string(),
        status: "exit status 128".to_string(),
        stderr: message.to_string(),
    }
}

impl MockBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_repo(&self, root: impl Into<PathBuf>) -> &Self {
        self.state.lock().unwrap().repos.insert(root.into());
        self
    }

    pub(crate) fn set_worktree_diff(&self, abs: impl Into<PathBuf>, diff: &str) -> &Self {
        self.state.lock().unwrap().worktree.insert(abs.into(), Ok(diff.to_string()));
        self
    }

    pub(crate) fn fail_worktree_diff(&self, abs: impl Into<PathBuf>, message: &str) -> &Self {
        self.state.lock().unwrap().worktree.insert(abs.into(), Err(message.to_string()));
        self
    }

    pub(crate) fn set_staged_diff(&self, abs: impl Into<PathBuf>, diff: &str) -> &Self {
        self.state.lock().unwrap().staged.insert(abs.into(), Ok(diff.to_string()));
        self
    }

    pub(crate) fn track(&self, abs: impl Into<PathBuf>) -> &Self {
        self.state.lock().unwrap().tracked.insert(abs.into());
        self
    }

    pub(crate) fn ignore(&self, abs: impl Into<PathBuf>) -> &Self {
        self.state.lock().unwrap().ignored.insert(abs.into());
        self
    }

    pub(crate) fn set_listings(
        &self,
        root: impl Into<PathBuf>,
        changed: &[&str],
        staged: &[&str],
        untracked: &[&str],
    ) -> &Self {
        let root = root.into();
        let to_vec = |names: &[&str]| names.iter().map(|n| n.to_string()).collect::<Vec<_>>();
        let mut state = self.state.lock().unwrap();
        state.changed.insert(root.clone(), to_vec(changed));
        state.staged_names.insert(root.clone(), to_vec(staged));
        state.untracked.insert(root, to_vec(untracked));
        self
    }

    pub(crate) fn fail_listings(&self, root: impl Into<PathBuf>) -> &Self {
        self.state.lock().unwrap().failing_listings.insert(root.into());
        self
    }

    /// Number of diff queries (worktree, staged, untracked) served so far.
    pub(crate) fn diff_calls(&self) -> usize {
        self.diff_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn ignore_calls(&self) -> usize {
        self.ignore_calls.load(Ordering::SeqCst)
    }

    fn lookup(
        &self,
        table: impl Fn(&State) -> &HashMap<PathBuf, Result<String, String>>,
        key: &Path,
    ) -> Result<String, VcsError> {
        self.diff_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        match table(&state).get(key) {
            Some(Ok(diff)) => Ok(diff.clone()),
            Some(Err(message)) => Err(command_error(message)),
            None => Ok(String::new()),
        }
    }

    fn listing(
        &self,
        root: &Path,
        table: impl Fn(&State) -> &HashMap<PathBuf, Vec<String>>,
    ) -> Result<Vec<String>, VcsError> {
        let state = self.state.lock().unwrap();
        if state.failing_listings.contains(root) {
            return Err(command_error("listing failed"));
        }
        Ok(table(&state).get(root).cloned().unwrap_or_default())
    }
}

impl VcsBackend for MockBackend {
    fn is_repo(&self, dir: &Path) -> bool {
        self.state.lock().unwrap().repos.contains(dir)
    }

    fn diff_worktree(&self, root: &Path, rel: &Path) -> Result<String, VcsError> {
        self.lookup(|s| &s.worktree, &root.join(rel))
    }

    fn diff_staged(&self, root: &Path, rel: &Path) -> Result<String, VcsError> {
        self.lookup(|s| &s.staged, &root.join(rel))
    }

    fn diff_untracked(&self, _root: &Path, abs: &Path) -> Result<String, VcsError> {
        self.diff_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "diff --git a/{0} b/{0}\nnew file mode 100644\n--- /dev/null\n+++ b/{0}\n@@ -0,0 +1 @@\n+content",
            abs.display()
        ))
    }

    fn is_tracked(&self, root: &Path, rel: &Path) -> bool {
        self.state.lock().unwrap().tracked.contains(&root.join(rel))
    }

    fn changed_files(&self, root: &Path) -> Result<Vec<String>, VcsError> {
        self.listing(root, |s| &s.changed)
    }

    fn staged_files(&self, root: &Path) -> Result<Vec<String>, VcsError> {
        self.listing(root, |s| &s.staged_names)
    }

    fn untracked_files(&self, root: &Path) -> Result<Vec<String>, VcsError> {
        self.listing(root, |s| &s.untracked)
    }

    fn current_branch(&self, _root: &Path) -> Option<String> {
        Some("main".to_string())
    }

    fn is_ignored(&self, _root: &Path, abs: &Path) -> bool {
        self.ignore_calls.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap().ignored.contains(abs)
    }
}
