use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use anyhow::{Context, Result};
use crossbeam_channel::{
    after, bounded, never, select, unbounded, Receiver, RecvError, RecvTimeoutError, Sender,
    TryRecvError,
};
use ignore::WalkBuilder;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher as _};
use tracing::Span;
use crate::config::WatcherConfig;
use crate::debounce::{FlushTimer, PendingSet};
use crate::events::{git_operation_marker, FsEventKind};
use crate::filter::{is_git_dir, is_git_state_file, PathFilter};

type SharedNotifier = Arc<Mutex<Option<RecommendedWatcher>>>;

fn lock(notifier: &Mutex<Option<RecommendedWatcher>>) -> MutexGuard<'_, Option<RecommendedWatcher>> {
    notifier.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Watches a directory tree and emits changed paths in debounced batches.
///
/// Every non-ignored directory is registered individually, so ignored trees
/// such as `node_modules` cost nothing. Writes to `.git/HEAD` or `.git/index`
/// are reported as the git-operation marker instead of a file path.
///
/// The output channel is bounded: when the consumer falls behind, delivery
/// blocks until it catches up or the watcher is closed. Nothing is dropped.
pub struct Watcher {
    root: PathBuf,
    output: Receiver<PathBuf>,
    done: Option<Sender<()>>,
    notifier: SharedNotifier,
    threads: Vec<JoinHandle<()>>,
    span: Span,
}

impl Watcher {
    pub fn new<P: AsRef<Path>>(root: P, filter: PathFilter, config: &WatcherConfig) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        anyhow::ensure!(root.is_dir(), "{} is not a directory", root.display());
        let filter = Arc::new(filter);
        let span = tracing::info_span!("watcher", root = %root.display());

        let (raw_tx, raw_rx) = unbounded::<notify::Result<Event>>();
        let notifier = notify::recommended_watcher(move |res| {
            // Fails only after the event loop has exited.
            let _ = raw_tx.send(res);
        })
        .context("Failed to create file system watcher")?;
        let notifier: SharedNotifier = Arc::new(Mutex::new(Some(notifier)));

        let mut registered = HashSet::new();
        span.in_scope(|| register_tree(&notifier, &root, &filter, &mut registered))?;
        span.in_scope(|| tracing::info!("Watching {} directories", registered.len()));

        let (done_tx, done_rx) = bounded::<()>(0);
        // Unbounded so the event loop never waits on a slow consumer. While the
        // output is full, batches queue here; backpressure applies at `out_tx`.
        let (batch_tx, batch_rx) = unbounded::<Vec<PathBuf>>();
        let (out_tx, out_rx) = bounded::<PathBuf>(config.channel_capacity);

        let event_loop = EventLoop {
            filter,
            notifier: Arc::clone(&notifier),
            registered,
            raw: raw_rx,
            done: done_rx.clone(),
            batches: batch_tx,
            interval: config.batch_interval(),
            timer: FlushTimer::default(),
            pending: PendingSet::new(),
        };

        let mut threads = Vec::with_capacity(2);

        let loop_span = span.clone();
        threads.push(
            thread::Builder::new()
                .name("vibewatch-events".to_string())
                .spawn(move || loop_span.in_scope(|| event_loop.run()))
                .context("Failed to spawn event loop thread")?,
        );

        let flush_span = span.clone();
        threads.push(
            thread::Builder::new()
                .name("vibewatch-flush".to_string())
                .spawn(move || flush_span.in_scope(|| deliver_batches(batch_rx, out_tx, done_rx)))
                .context("Failed to spawn delivery thread")?,
        );

        Ok(Self {
            root,
            output: out_rx,
            done: Some(done_tx),
            notifier,
            threads,
            span,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The stream of changed paths. Disconnects once the watcher is closed
    /// and the remaining paths have been read.
    pub fn changes(&self) -> &Receiver<PathBuf> {
        &self.output
    }

    pub fn recv(&self) -> Result<PathBuf, RecvError> {
        self.output.recv()
    }

    pub fn try_recv(&self) -> Result<PathBuf, TryRecvError> {
        self.output.try_recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<PathBuf, RecvTimeoutError> {
        self.output.recv_timeout(timeout)
    }

    /// Stops watching and waits for the background threads to exit.
    /// Calling it more than once is harmless.
    pub fn close(&mut self) {
        let Some(done) = self.done.take() else {
            return;
        };
        let _enter = self.span.enter();

        drop(done);
        drop(lock(&self.notifier).take());

        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("Watcher thread panicked");
            }
        }
        tracing::debug!("Watcher closed");
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.close();
    }
}

/// Registers `dir` and every non-ignored directory beneath it.
///
/// Only a failure on `dir` itself is an error; nested directories that cannot
/// be watched are logged and skipped.
fn register_tree(
    notifier: &Mutex<Option<RecommendedWatcher>>,
    dir: &Path,
    filter: &Arc<PathFilter>,
    registered: &mut HashSet<PathBuf>,
) -> Result<()> {
    let mut guard = lock(notifier);
    let Some(notifier) = guard.as_mut() else {
        return Ok(());
    };

    let walk_filter = Arc::clone(filter);
    let walker = WalkBuilder::new(dir)
        .standard_filters(false)
        .follow_links(false)
        .filter_entry(move |entry| {
            entry.file_type().map_or(false, |ft| ft.is_dir()) && !walk_filter.should_ignore(entry.path())
        })
        .build();

    for result in walker {
        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("Skipping unreadable entry under {}: {}", dir.display(), err);
                continue;
            }
        };

        // Always (re)watch: a directory recreated at a known path is a new inode.
        let path = entry.into_path();
        registered.insert(path.clone());

        if let Err(err) = notifier.watch(&path, RecursiveMode::NonRecursive) {
            registered.remove(&path);
            if path == dir {
                return Err(err).with_context(|| format!("Failed to watch {}", dir.display()));
            }
            tracing::warn!("Failed to watch {}: {}", path.display(), err);
        }
    }

    Ok(())
}

/// Owns the pending set and the flush timer; nothing else touches them.
struct EventLoop {
    filter: Arc<PathFilter>,
    notifier: SharedNotifier,
    registered: HashSet<PathBuf>,
    raw: Receiver<notify::Result<Event>>,
    done: Receiver<()>,
    batches: Sender<Vec<PathBuf>>,
    interval: Duration,
    timer: FlushTimer,
    pending: PendingSet,
}

impl EventLoop {
    fn run(mut self) {
        let done = self.done.clone();
        let raw = self.raw.clone();
        loop {
            let deadline = match self.timer.deadline() {
                Some(deadline) => after(deadline.saturating_duration_since(Instant::now())),
                None => never(),
            };

            select! {
                recv(done) -> _ => break,
                recv(raw) -> msg => match msg {
                    Ok(Ok(event)) => self.handle_event(event),
                    Ok(Err(err)) => tracing::debug!("Notify error: {}", err),
                    Err(_) => break,
                },
                recv(deadline) -> _ => self.flush(),
            }
        }
        tracing::debug!("Event loop stopped with {} paths pending", self.pending.len());
    }

    fn handle_event(&mut self, event: Event) {
        let kind = FsEventKind::from(&event.kind);
        for path in event.paths {
            self.handle_path(path, kind);
        }
    }

    fn handle_path(&mut self, path: PathBuf, kind: FsEventKind) {
        if self.filter.should_ignore(&path) {
            return;
        }

        // A directory moved away or deleted takes its subtree with it.
        if matches!(kind, FsEventKind::Remove | FsEventKind::Rename) {
            self.registered.retain(|dir| !dir.starts_with(&path));
        }

        // Directories created in place or moved in from outside.
        if matches!(kind, FsEventKind::Create | FsEventKind::Rename) && path.is_dir() {
            tracing::debug!("Registering new directory {}", path.display());
            if let Err(err) = register_tree(&self.notifier, &path, &self.filter, &mut self.registered) {
                tracing::warn!("{:#}", err);
            }
            return;
        }

        if is_git_state_file(&path) {
            tracing::debug!("Git state changed: {}", path.display());
            self.enqueue(git_operation_marker());
            return;
        }

        // Only HEAD and index matter inside `.git`.
        if is_git_dir(&path) || !kind.is_content_change() {
            return;
        }

        self.enqueue(path);
    }

    fn enqueue(&mut self, path: PathBuf) {
        self.pending.insert(path);
        self.timer.schedule(Instant::now(), self.interval);
    }

    fn flush(&mut self) {
        if !self.timer.fire(Instant::now()) {
            return;
        }

        let batch = self.pending.take();
        if batch.is_empty() {
            return;
        }

        tracing::debug!("Flushing {} changed paths", batch.len());
        if self.batches.send(batch).is_err() {
            tracing::debug!("Delivery thread is gone, dropping batch");
        }
    }
}

/// Pushes batches to the bounded output, giving up as soon as `done` closes.
fn deliver_batches(batches: Receiver<Vec<PathBuf>>, output: Sender<PathBuf>, done: Receiver<()>) {
    for batch in batches.iter() {
        for path in batch {
            select! {
                send(output, path) -> res => {
                    if res.is_err() {
                        return;
                    }
                }
                recv(done) -> _ => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use crate::events::is_git_operation;
    use crate::vcs::mock::MockBackend;

    fn config(batch_interval_ms: u64, channel_capacity: usize) -> WatcherConfig {
        WatcherConfig {
            batch_interval_ms,
            channel_capacity,
        }
    }

    fn watch(root: &Path, config: &WatcherConfig) -> Watcher {
        let filter = PathFilter::new(root, vec![root.to_path_buf()], Arc::new(MockBackend::new()));
        Watcher::new(root, filter, config).expect("Failed to start watcher")
    }

    #[test]
    fn test_rejects_missing_root() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let missing = temp_dir.path().join("missing");
        let filter = PathFilter::new(&missing, Vec::new(), Arc::new(MockBackend::new()));

        assert!(Watcher::new(&missing, filter, &WatcherConfig::default()).is_err());
    }

    #[test]
    fn test_close_is_idempotent_and_disconnects() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut watcher = watch(temp_dir.path(), &WatcherConfig::default());

        watcher.close();
        watcher.close();

        assert!(matches!(watcher.recv_timeout(Duration::from_millis(200)), Err(RecvTimeoutError::Disconnected)));
    }

    #[test]
    fn test_close_unblocks_full_output() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().canonicalize().expect("Failed to canonicalize");
        let mut watcher = watch(&root, &config(20, 1));

        for i in 0..5 {
            fs::write(root.join(format!("file{}.txt", i)), "x").expect("Failed to write file");
        }
        thread::sleep(Duration::from_millis(300));

        // The delivery thread is blocked on a full channel; close must not hang.
        watcher.close();
        let drained: Vec<_> = watcher.changes().try_iter().collect();
        assert!(drained.len() <= 5);
    }

    #[test]
    fn test_git_head_write_emits_marker() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().canonicalize().expect("Failed to canonicalize");
        fs::create_dir_all(root.join(".git/objects")).expect("Failed to create .git");
        fs::write(root.join(".git/HEAD"), "ref: refs/heads/main\n").expect("Failed to write HEAD");

        let watcher = watch(&root, &config(50, 64));
        fs::write(root.join(".git/HEAD"), "ref: refs/heads/dev\n").expect("Failed to write HEAD");
        fs::write(root.join(".git/objects/blob"), "x").expect("Failed to write object");

        let path = watcher.recv_timeout(Duration::from_secs(5)).expect("Expected a change");
        assert!(is_git_operation(&path));
        assert!(watcher.recv_timeout(Duration::from_millis(300)).is_err());
    }
}
