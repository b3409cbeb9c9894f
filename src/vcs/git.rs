use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use super::{VcsBackend, VcsError};

/// [`VcsBackend`] backed by the `git` command line.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
    context_lines: usize,
}

impl GitCli {
    pub fn new(context_lines: usize) -> Self {
        Self {
            program: PathBuf::from("git"),
            context_lines,
        }
    }

    /// Use a specific git executable instead of the one on `PATH`.
    pub fn with_program<P: Into<PathBuf>>(mut self, program: P) -> Self {
        self.program = program.into();
        self
    }

    pub fn context_lines(&self) -> usize {
        self.context_lines
    }

    /// Whether the configured executable runs at all.
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    fn git(&self, root: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-C").arg(root);
        // Read-only queries must not refresh .git/index, or the watcher would
        // see its own git calls as repository operations.
        cmd.env("GIT_OPTIONAL_LOCKS", "0");
        cmd.stdin(Stdio::null());
        cmd
    }

    fn unified(&self) -> String {
        format!("--unified={}", self.context_lines)
    }

    /// Runs the command and returns its trimmed stdout, failing on a non-zero exit.
    fn run(cmd: &mut Command) -> Result<String, VcsError> {
        let output = cmd.output()?;
        if !output.status.success() {
            return Err(command_error(cmd, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn succeeds(cmd: &mut Command) -> bool {
        cmd.output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    fn list(cmd: &mut Command) -> Result<Vec<String>, VcsError> {
        let output = cmd.output()?;
        if !output.status.success() {
            return Err(command_error(cmd, &output));
        }
        Ok(parse_name_list(&String::from_utf8_lossy(&output.stdout)))
    }

    fn has_head(&self, root: &Path) -> bool {
        Self::succeeds(self.git(root).args(["rev-parse", "--verify", "--quiet", "HEAD"]))
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new(3)
    }
}

impl VcsBackend for GitCli {
    fn is_repo(&self, dir: &Path) -> bool {
        Self::succeeds(self.git(dir).args(["rev-parse", "--git-dir"]))
    }

    fn diff_worktree(&self, root: &Path, rel: &Path) -> Result<String, VcsError> {
        let unified = self.unified();
        match Self::run(
            self.git(root)
                .args(["diff", "--no-color", unified.as_str(), "HEAD", "--"])
                .arg(rel),
        ) {
            Ok(diff) => Ok(diff),
            // No commits yet: the index is the only baseline there is.
            Err(_) if !self.has_head(root) => Self::run(
                self.git(root)
                    .args(["diff", "--no-color", unified.as_str(), "--"])
                    .arg(rel),
            ),
            Err(err) => Err(err),
        }
    }

    fn diff_staged(&self, root: &Path, rel: &Path) -> Result<String, VcsError> {
        let unified = self.unified();
        Self::run(
            self.git(root)
                .args(["diff", "--no-color", unified.as_str(), "--cached", "--"])
                .arg(rel),
        )
    }

    fn diff_untracked(&self, root: &Path, abs: &Path) -> Result<String, VcsError> {
        let unified = self.unified();
        let mut cmd = self.git(root);
        cmd.args(["diff", "--no-color", unified.as_str(), "--no-index", "--", "/dev/null"])
            .arg(abs);
        let output = cmd.output()?;
        // --no-index exits 1 whenever the inputs differ, which they always do here.
        match output.status.code() {
            Some(0) | Some(1) => Ok(String::from_utf8_lossy(&output.stdout).trim().to_string()),
            _ => Err(command_error(&cmd, &output)),
        }
    }

    fn is_tracked(&self, root: &Path, rel: &Path) -> bool {
        Self::succeeds(self.git(root).args(["ls-files", "--error-unmatch", "--"]).arg(rel))
    }

    // `--relative` keeps names relative to `root` (and under it) when `root` is
    // a subdirectory of the work tree; ls-files already behaves that way.
    fn changed_files(&self, root: &Path) -> Result<Vec<String>, VcsError> {
        Self::list(self.git(root).args(["diff", "--name-only", "--relative", "-z"]))
    }

    fn staged_files(&self, root: &Path) -> Result<Vec<String>, VcsError> {
        Self::list(self.git(root).args(["diff", "--name-only", "--relative", "-z", "--cached"]))
    }

    fn untracked_files(&self, root: &Path) -> Result<Vec<String>, VcsError> {
        Self::list(self.git(root).args(["ls-files", "--others", "--exclude-standard", "-z"]))
    }

    fn current_branch(&self, root: &Path) -> Option<String> {
        let branch = Self::run(self.git(root).args(["rev-parse", "--abbrev-ref", "HEAD"]))
            .or_else(|_| Self::run(self.git(root).args(["symbolic-ref", "--short", "HEAD"])))
            .ok()?;
        (!branch.is_empty()).then_some(branch)
    }

    fn is_ignored(&self, root: &Path, abs: &Path) -> bool {
        // check-ignore exits 0 when the path is ignored, 1 when it is not.
        Self::succeeds(self.git(root).args(["check-ignore", "-q", "--"]).arg(abs))
    }
}

/// Splits NUL-separated `-z` output into names.
fn parse_name_list(output: &str) -> Vec<String> {
    output
        .split('\0')
        .map(|name| name.trim_matches('\n'))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn command_error(cmd: &Command, output: &Output) -> VcsError {
    let args: Vec<String> = cmd
        .get_args()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    // Drop the leading `-C <root>`.
    let skip = if args.first().map(String::as_str) == Some("-C") { 2 } else { 0 };
    let command = args[skip.min(args.len())..].join(" ");

    let status = match output.status.code() {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    };

    VcsError::Command {
        command,
        status,
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}
