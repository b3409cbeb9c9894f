pub mod cli;
pub mod config;
pub mod debounce;
pub mod diff;
pub mod discovery;
pub mod events;
pub mod filter;
pub mod vcs;
pub mod watcher;

pub use config::VibewatchConfig;
pub use diff::{DiffEngine, DiffSource, RepoError, RepoRouter};
pub use discovery::discover_repos;
pub use events::{DiffEntry, EntryStatus, GIT_OPERATION_MARKER};
pub use filter::PathFilter;
pub use vcs::{GitCli, VcsBackend, VcsError};
pub use watcher::Watcher;
