//! Batching state for the watcher's event loop.
//!
//! Both types are owned by a single thread; nothing here is shared.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Quiet-period timer. Every `schedule` pushes the deadline out to a full
/// interval from now, so a burst keeps extending the window until it stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum FlushTimer {
    #[default]
    Idle,
    Pending(Instant),
}

impl FlushTimer {
    pub fn schedule(&mut self, now: Instant, interval: Duration) {
        *self = Self::Pending(now + interval);
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self {
            Self::Idle => None,
            Self::Pending(deadline) => Some(*deadline),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// Returns true and goes idle if the deadline has passed.
    pub fn fire(&mut self, now: Instant) -> bool {
        match *self {
            Self::Pending(deadline) if now >= deadline => {
                *self = Self::Idle;
                true
            }
            _ => false,
        }
    }
}

/// Paths collected between two flushes; each path is kept once.
#[derive(Debug, Default)]
pub struct PendingSet {
    paths: HashSet<PathBuf>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the path was already pending.
    pub fn insert(&mut self, path: PathBuf) -> bool {
        self.paths.insert(path)
    }

    /// Swaps in an empty set and returns what was pending.
    pub fn take(&mut self) -> Vec<PathBuf> {
        std::mem::take(&mut self.paths).into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
