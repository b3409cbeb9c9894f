use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use lru::LruCache;
use crate::events::DiffEntry;

/// A diff classification remembered for one path.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedDiff {
    pub diff: String,
    pub error: String,
    pub is_new: bool,
    pub cached_at: Instant,
}

/// Per-repository cache of classified diffs, keyed by absolute path.
///
/// Entries older than the freshness window are treated as absent. The cache
/// is read, then conditionally rewritten, under one short lock each time; two
/// racing misses for the same path both recompute and the last write wins.
pub struct DiffCache {
    entries: Mutex<LruCache<PathBuf, CachedDiff>>,
    freshness: Duration,
}

impl DiffCache {
    pub fn new(capacity: usize, freshness: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            freshness,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<PathBuf, CachedDiff>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached result for `path` if it is still within the freshness window.
    pub fn get_fresh(&self, path: &Path) -> Option<CachedDiff> {
        let mut entries = self.lock();
        let fresh = entries.get(path)?.cached_at.elapsed() < self.freshness;
        if fresh {
            entries.get(path).cloned()
        } else {
            entries.pop(path);
            None
        }
    }

    pub fn insert(&self, path: &Path, entry: &DiffEntry) {
        self.lock().put(
            path.to_path_buf(),
            CachedDiff {
                diff: entry.diff.clone(),
                error: entry.error.clone(),
                is_new: entry.is_new,
                cached_at: Instant::now(),
            },
        );
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn freshness(&self) -> Duration {
        self.freshness
    }
}
