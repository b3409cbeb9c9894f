use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, OnceLock};
use regex::Regex;
use crate::discovery::{find_repo_root, sort_longest_first, GIT_DIR};
use crate::vcs::VcsBackend;

/// Directory and file names that are never watched, wherever they appear.
pub const IGNORED_NAMES: &[&str] = &[
    ".git",
    "node_modules",
    ".next",
    "dist",
    "build",
    "__pycache__",
    ".venv",
    "venv",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    ".DS_Store",
];

/// Editor swap and backup files.
pub const IGNORED_NAME_SUFFIXES: &[&str] = &[".swp", ".swo", "~"];

/// Compiled binaries and build artifacts.
pub const BINARY_SUFFIXES: &[&str] = &[".exe", ".so", ".dylib", ".a", ".o", ".out"];

/// Extensions ignored regardless of case.
pub const IGNORED_EXTENSIONS: &[&str] = &[
    ".log", ".tmp", ".bak", ".pid", ".lock", ".exe", ".dll", ".so", ".dylib", ".a",
];

/// Suffixes left out of the dirty-file snapshot.
pub const TRANSIENT_SUFFIXES: &[&str] = &[".tmp", ".log", ".bak", ".swp"];

/// Files inside `.git` whose changes signal a commit, checkout, reset or stage.
pub const GIT_STATE_FILES: &[&str] = &["HEAD", "index"];

fn generated_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Editors and compilers write temp files like `watcher.go.123456789`.
    PATTERN.get_or_init(|| Regex::new(r"\.[0-9]{8,}$").expect("generated-name pattern is valid"))
}

/// Whether a repository-relative name is a transient artifact (case-insensitive).
pub fn is_transient_artifact(name: &str) -> bool {
    let lower = name.to_lowercase();
    TRANSIENT_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

/// Whether `path` is `.git/HEAD` or `.git/index`.
pub fn is_git_state_file(path: &Path) -> bool {
    let is_state_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .map_or(false, |name| GIT_STATE_FILES.contains(&name));

    is_state_name && path.parent().map_or(false, is_git_dir)
}

/// Whether `path` names a `.git` metadata directory.
pub fn is_git_dir(path: &Path) -> bool {
    path.file_name().map_or(false, |name| name == GIT_DIR)
}

#[cfg(unix)]
fn is_extensionless_executable(path: &Path, base: &str) -> bool {
    use std::os::unix::fs::PermissionsExt;

    if base.contains('.') {
        return false;
    }
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_extensionless_executable(_path: &Path, _base: &str) -> bool {
    false
}

/// Decides which paths the watcher reports.
///
/// Built-in rules are checked first; paths that survive them are checked
/// against the ignore rules of the repository that owns them.
pub struct PathFilter {
    root: PathBuf,
    root_name: Option<String>,
    repo_roots: Vec<PathBuf>,
    backend: Arc<dyn VcsBackend>,
}

impl PathFilter {
    pub fn new<P: Into<PathBuf>>(root: P, mut repo_roots: Vec<PathBuf>, backend: Arc<dyn VcsBackend>) -> Self {
        let root = root.into();
        let root_name = root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        sort_longest_first(&mut repo_roots);

        Self {
            root,
            root_name,
            repo_roots,
            backend,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn repo_roots(&self) -> &[PathBuf] {
        &self.repo_roots
    }

    pub fn should_watch<P: AsRef<Path>>(&self, path: P) -> bool {
        !self.should_ignore(path)
    }

    /// Returns true if `path` should not be watched or reported.
    ///
    /// Depends only on `path`, the configured roots and the repository's ignore
    /// rules; the same path always gets the same answer.
    pub fn should_ignore<P: AsRef<Path>>(&self, path: P) -> bool {
        let path = path.as_ref();

        // `.git/HEAD`, `.git/index` and the `.git` directory holding them stay
        // visible even though `.git` is otherwise ignored.
        if is_git_state_file(path) || is_git_dir(path) || self.is_watched_root(path) {
            return false;
        }

        let base = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let full = path.to_string_lossy();
        if BINARY_SUFFIXES.iter().any(|suffix| full.ends_with(suffix)) {
            return true;
        }

        if generated_name_pattern().is_match(&base) {
            return true;
        }

        if is_extensionless_executable(path, &base) {
            return true;
        }

        if IGNORED_NAMES.contains(&base.as_str())
            || IGNORED_NAME_SUFFIXES.iter().any(|suffix| base.ends_with(suffix))
        {
            return true;
        }

        if self.has_ignored_component(path) {
            return true;
        }

        let lower = base.to_lowercase();
        if IGNORED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
            return true;
        }

        match find_repo_root(path, &self.repo_roots) {
            Some(repo_root) => self.backend.is_ignored(repo_root, path),
            None => false,
        }
    }

    /// The watched root or one of the known repository roots.
    fn is_watched_root(&self, path: &Path) -> bool {
        path == self.root || self.repo_roots.iter().any(|root| root == path)
    }

    /// Checks each component below the watched root against [`IGNORED_NAMES`].
    ///
    /// A first component equal to the root's own name is exempt, as is any
    /// component that is itself a repository root, so a repository called
    /// `build` does not exclude itself.
    fn has_ignored_component(&self, path: &Path) -> bool {
        let (base, rel) = match path.strip_prefix(&self.root) {
            Ok(rel) => (self.root.clone(), rel),
            Err(_) => (PathBuf::new(), path),
        };

        let mut current = base;
        rel.components().enumerate().any(|(idx, component)| {
            current.push(component);
            match component {
                Component::Normal(part) => {
                    let part = part.to_string_lossy();
                    if idx == 0 && self.root_name.as_deref() == Some(part.as_ref()) {
                        return false;
                    }
                    if self.repo_roots.contains(&current) {
                        return false;
                    }
                    IGNORED_NAMES.contains(&part.as_ref())
                }
                _ => false,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use crate::vcs::mock::MockBackend;

    fn filter_with(backend: Arc<MockBackend>) -> PathFilter {
        PathFilter::new("/test", vec![PathBuf::from("/test/repo")], backend)
    }

    fn filter() -> PathFilter {
        filter_with(Arc::new(MockBackend::new()))
    }

    #[test]
    fn test_git_metadata_allow_list() {
        let filter = filter();

        assert!(!filter.should_ignore("/test/repo/.git"));
        assert!(!filter.should_ignore("/test/repo/.git/HEAD"));
        assert!(!filter.should_ignore("/test/repo/.git/index"));
        assert!(filter.should_ignore("/test/repo/.git/objects/xyz"));
        assert!(filter.should_ignore("/test/repo/.git/refs/heads/HEAD"));
        assert!(filter.should_ignore("/test/repo/.git/index.lock"));
    }

    #[test]
    fn test_builtin_ignores() {
        let filter = filter();

        assert!(filter.should_ignore("/test/repo/node_modules"));
        assert!(filter.should_ignore("/test/repo/node_modules/pkg/index.js"));
        assert!(filter.should_ignore("/test/repo/.DS_Store"));
        assert!(filter.should_ignore("/test/repo/src/.main.rs.swp"));
        assert!(filter.should_ignore("/test/repo/notes.txt~"));
        assert!(filter.should_ignore("/test/repo/__pycache__/mod.pyc"));
        assert!(!filter.should_ignore("/test/repo/rebuild.sh"));
    }

    #[test]
    fn test_ignored_extensions() {
        let filter = filter();

        assert!(filter.should_ignore("/test/repo/test.tmp"));
        assert!(filter.should_ignore("/test/repo/server.LOG"));
        assert!(filter.should_ignore("/test/repo/Cargo.lock"));
        assert!(filter.should_ignore("/test/repo/app.pid"));
    }

    #[test]
    fn test_binary_files() {
        let filter = filter();

        assert!(filter.should_ignore("/test/repo/program.exe"));
        assert!(filter.should_ignore("/test/repo/lib.so"));
        assert!(filter.should_ignore("/test/repo/lib.dylib"));
        assert!(filter.should_ignore("/test/repo/main.o"));
        assert!(filter.should_ignore("/test/repo/a.out"));
    }

    #[test]
    fn test_generated_filenames() {
        let filter = filter();

        assert!(filter.should_ignore("/test/repo/watcher.go.123456789"));
        assert!(!filter.should_ignore("/test/repo/release.1234567"));
    }

    #[test]
    fn test_normal_files() {
        let filter = filter();

        assert!(!filter.should_ignore("/test/repo/main.go"));
        assert!(!filter.should_ignore("/test/repo/index.js"));
        assert!(!filter.should_ignore("/test/repo/src"));
        assert!(!filter.should_ignore("/test"));
    }

    #[test]
    fn test_delegates_to_repository_ignore_rules() {
        let backend = Arc::new(MockBackend::new());
        backend.ignore("/test/repo/secret.env");
        let filter = filter_with(backend.clone());

        assert!(filter.should_ignore("/test/repo/secret.env"));
        assert!(!filter.should_ignore("/test/repo/public.env"));
        assert_eq!(backend.ignore_calls(), 2);

        // Outside every known repository there is nothing to ask.
        assert!(!filter.should_ignore("/test/loose.txt"));
        assert_eq!(backend.ignore_calls(), 2);
    }

    #[test]
    fn test_is_idempotent() {
        let filter = filter();

        for path in ["/test/repo/a.rs", "/test/repo/.git/HEAD", "/test/repo/dist/x.js"] {
            assert_eq!(filter.should_ignore(path), filter.should_ignore(path));
        }
    }

    #[test]
    fn test_root_named_like_denylist_entry() {
        let backend = Arc::new(MockBackend::new());
        let filter = PathFilter::new("/work/build", vec![PathBuf::from("/work/build")], backend);

        assert!(!filter.should_ignore("/work/build"));
        assert!(!filter.should_ignore("/work/build/src/main.rs"));
        assert!(!filter.should_ignore("/work/build/build/notes.md"));
        assert!(filter.should_ignore("/work/build/src/build/out.rs"));
    }

    #[test]
    fn test_discovered_repository_named_like_denylist_entry() {
        let backend = Arc::new(MockBackend::new());
        let filter = PathFilter::new(
            "/code",
            vec![PathBuf::from("/code/build"), PathBuf::from("/code/api")],
            backend,
        );

        assert!(!filter.should_ignore("/code/build"));
        assert!(!filter.should_ignore("/code/build/src/main.rs"));
        assert!(filter.should_ignore("/code/build/dist/app.js"));
        assert!(filter.should_ignore("/code/api/build/out.rs"));
        assert!(filter.should_ignore("/code/scratch/build"));
    }

    #[cfg(unix)]
    #[test]
    fn test_extensionless_executables() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path();
        let filter = PathFilter::new(root, Vec::new(), Arc::new(MockBackend::new()));

        let binary = root.join("server");
        fs::write(&binary, b"\x7fELF").expect("Failed to write binary");
        fs::set_permissions(&binary, fs::Permissions::from_mode(0o755)).expect("Failed to chmod");

        let plain = root.join("LICENSE");
        fs::write(&plain, "MIT").expect("Failed to write file");
        fs::set_permissions(&plain, fs::Permissions::from_mode(0o644)).expect("Failed to chmod");

        let dir = root.join("bin");
        fs::create_dir(&dir).expect("Failed to create dir");

        assert!(filter.should_ignore(&binary));
        assert!(!filter.should_ignore(&plain));
        assert!(!filter.should_ignore(&dir));
    }

    #[test]
    fn test_transient_artifacts() {
        assert!(is_transient_artifact("src/scratch.TMP"));
        assert!(is_transient_artifact("debug.log"));
        assert!(is_transient_artifact(".notes.md.swp"));
        assert!(!is_transient_artifact("src/lib.rs"));
    }

    #[test]
    fn test_git_state_files() {
        assert!(is_git_state_file(Path::new("/r/.git/HEAD")));
        assert!(is_git_state_file(Path::new("/r/.git/index")));
        assert!(!is_git_state_file(Path::new("/r/HEAD")));
        assert!(!is_git_state_file(Path::new("/r/.git/ORIG_HEAD")));
    }
}
