use std::path::{Path, PathBuf};
use std::time::SystemTime;
use notify::event::{EventKind, ModifyKind};
use serde::{Deserialize, Serialize};

/// Reserved path pushed by the watcher when `.git/HEAD` or `.git/index` changes.
///
/// Consumers compare against it by value; it never names a real file.
pub const GIT_OPERATION_MARKER: &str = "__GIT_OPERATION__";

pub fn git_operation_marker() -> PathBuf {
    PathBuf::from(GIT_OPERATION_MARKER)
}

pub fn is_git_operation<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref() == Path::new(GIT_OPERATION_MARKER)
}

/// A classified diff for one file, as observed at `timestamp`.
///
/// Entries are never mutated after being handed out; a later change to the
/// same path produces a new entry that supersedes this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub file_path: PathBuf,
    /// Display name of the owning repository, empty in single-repo mode.
    pub repo: String,
    pub timestamp: SystemTime,
    /// Raw unified diff text as produced by git.
    pub diff: String,
    pub is_new: bool,
    pub is_deleted: bool,
    /// Non-fatal error text; empty when the diff was computed.
    pub error: String,
}

/// How a consumer should treat an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Global refresh marker, not a file.
    GitOperation,
    Error,
    New,
    Deleted,
    Modified,
    /// File settled back to its committed state; drop it from any active list.
    Clean,
}

impl DiffEntry {
    pub fn new(file_path: PathBuf) -> Self {
        Self {
            file_path,
            repo: String::new(),
            timestamp: SystemTime::now(),
            diff: String::new(),
            is_new: false,
            is_deleted: false,
            error: String::new(),
        }
    }

    /// The entry returned for the git-operation marker.
    pub fn git_operation() -> Self {
        Self::new(git_operation_marker())
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = error.into();
        self
    }

    pub fn with_repo(mut self, repo: impl Into<String>) -> Self {
        self.repo = repo.into();
        self
    }

    pub fn is_git_operation(&self) -> bool {
        is_git_operation(&self.file_path)
    }

    pub fn is_clean(&self) -> bool {
        self.diff.is_empty() && self.error.is_empty() && !self.is_new
    }

    pub fn status(&self) -> EntryStatus {
        if self.is_git_operation() {
            EntryStatus::GitOperation
        } else if !self.error.is_empty() {
            EntryStatus::Error
        } else if self.is_new {
            EntryStatus::New
        } else if self.is_deleted && !self.diff.is_empty() {
            EntryStatus::Deleted
        } else if self.diff.is_empty() {
            EntryStatus::Clean
        } else {
            EntryStatus::Modified
        }
    }
}

/// The subset of notify event kinds the watcher cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsEventKind {
    Create,
    Write,
    Remove,
    Rename,
    /// Access, metadata-only changes and anything notify could not classify.
    Other,
}

impl From<&EventKind> for FsEventKind {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Create(_) => FsEventKind::Create,
            EventKind::Modify(ModifyKind::Name(_)) => FsEventKind::Rename,
            EventKind::Modify(ModifyKind::Metadata(_)) => FsEventKind::Other,
            EventKind::Modify(_) => FsEventKind::Write,
            EventKind::Remove(_) => FsEventKind::Remove,
            _ => FsEventKind::Other,
        }
    }
}

impl FsEventKind {
    /// Whether this kind can change the content git would diff.
    pub fn is_content_change(self) -> bool {
        !matches!(self, FsEventKind::Other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode};

    #[test]
    fn test_git_operation_marker() {
        let entry = DiffEntry::git_operation();

        assert!(entry.is_git_operation());
        assert!(is_git_operation(GIT_OPERATION_MARKER));
        assert!(!is_git_operation("/repo/src/main.rs"));
        assert_eq!(entry.status(), EntryStatus::GitOperation);
        assert!(entry.diff.is_empty());
        assert!(entry.error.is_empty());
    }

    #[test]
    fn test_entry_status() {
        let path = PathBuf::from("/repo/a.rs");

        let clean = DiffEntry::new(path.clone());
        assert!(clean.is_clean());
        assert_eq!(clean.status(), EntryStatus::Clean);

        let mut modified = DiffEntry::new(path.clone());
        modified.diff = "@@ -1 +1 @@\n-a\n+b".to_string();
        assert_eq!(modified.status(), EntryStatus::Modified);

        let mut new = DiffEntry::new(path.clone());
        new.is_new = true;
        assert_eq!(new.status(), EntryStatus::New);

        let errored = DiffEntry::new(path).with_error("boom");
        assert_eq!(errored.status(), EntryStatus::Error);
    }

    #[test]
    fn test_fs_event_kind_mapping() {
        assert_eq!(FsEventKind::from(&EventKind::Create(CreateKind::File)), FsEventKind::Create);
        assert_eq!(
            FsEventKind::from(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            FsEventKind::Write
        );
        assert_eq!(
            FsEventKind::from(&EventKind::Modify(ModifyKind::Name(RenameMode::Both))),
            FsEventKind::Rename
        );
        assert_eq!(FsEventKind::from(&EventKind::Remove(RemoveKind::File)), FsEventKind::Remove);
        assert_eq!(
            FsEventKind::from(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions))),
            FsEventKind::Other
        );
        assert_eq!(FsEventKind::from(&EventKind::Access(AccessKind::Any)), FsEventKind::Other);
        assert!(!FsEventKind::Other.is_content_change());
        assert!(FsEventKind::Rename.is_content_change());
    }

    #[test]
    fn test_entry_serializes() {
        let entry = DiffEntry::new(PathBuf::from("/repo/a.rs")).with_repo("repo");
        let json = serde_json::to_string(&entry).expect("Failed to serialize entry");

        assert!(json.contains("\"repo\":\"repo\""));
        assert!(json.contains("\"is_new\":false"));
    }
}
