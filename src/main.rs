use clap::Parser;
use anyhow::{Context, Result};
use crossbeam_channel::RecvTimeoutError;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use vibewatch::{
    cli::{Cli, OutputFormat},
    diff::DiffSource,
    events::{is_git_operation, DiffEntry, EntryStatus},
    filter::PathFilter,
    vcs::{GitCli, VcsBackend},
    watcher::Watcher,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(err) = cli.validate() {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }

    cli.setup_logging();

    let config = cli.resolve_config()?;
    if let Err(err) = config.validate() {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }

    let watch_path = cli.get_watch_path();
    let watch_path = watch_path
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", watch_path.display()))?;
    tracing::info!("Starting vibewatch on: {}", watch_path.display());

    let git = GitCli::new(config.diff.context_lines);
    if !git.is_available() {
        eprintln!("Error: git executable not found in PATH");
        std::process::exit(1);
    }
    let backend: Arc<dyn VcsBackend> = Arc::new(git);

    let source = match DiffSource::open(&watch_path, Arc::clone(&backend), &config.cache) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Error: {}", err);
            std::process::exit(1);
        }
    };
    print_repositories(&source);

    let filter = PathFilter::new(&watch_path, source.repo_roots(), Arc::clone(&backend));
    let mut watcher = Watcher::new(&watch_path, filter, &config.watcher)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    for entry in source.dirty_files() {
        print_entry(&entry, &watch_path, &cli)?;
    }

    while running.load(Ordering::SeqCst) {
        match watcher.recv_timeout(Duration::from_millis(100)) {
            Ok(path) if is_git_operation(&path) => {
                tracing::debug!("Git operation detected, refreshing");
                source.clear_cache();
                print_entry(&DiffEntry::git_operation(), &watch_path, &cli)?;
                for entry in source.dirty_files() {
                    print_entry(&entry, &watch_path, &cli)?;
                }
            }
            Ok(path) => print_entry(&source.diff(&path), &watch_path, &cli)?,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    watcher.close();
    Ok(())
}

fn print_repositories(source: &DiffSource) {
    let repos = source.repositories();
    if source.is_multi() {
        eprintln!("Watching {} repositories:", repos.len());
    }
    for (name, root, branch) in repos {
        let branch = branch.unwrap_or_else(|| "(no branch)".to_string());
        eprintln!("  {} [{}] {}", name, branch, root.display());
    }
    eprintln!("Press Ctrl+C to quit");
    eprintln!("---");
}

fn print_entry(entry: &DiffEntry, root: &Path, cli: &Cli) -> Result<()> {
    match cli.output {
        OutputFormat::Json => println!("{}", serde_json::to_string(entry)?),
        OutputFormat::Text => print_text_entry(entry, root, cli),
        OutputFormat::Compact => print_compact_entry(entry, root),
    }
    Ok(())
}

fn display_path(entry: &DiffEntry, root: &Path) -> String {
    let rel = entry.file_path.strip_prefix(root).unwrap_or(&entry.file_path);
    if entry.repo.is_empty() {
        rel.display().to_string()
    } else {
        format!("[{}] {}", entry.repo, rel.display())
    }
}

fn print_text_entry(entry: &DiffEntry, root: &Path, cli: &Cli) {
    let time_str = chrono::DateTime::<chrono::Local>::from(entry.timestamp)
        .format("%H:%M:%S")
        .to_string();
    let status = entry.status();

    if status == EntryStatus::GitOperation {
        println!("[{}] REFRESH git state changed", time_str);
        println!();
        return;
    }

    let label = match status {
        EntryStatus::New => "NEW",
        EntryStatus::Modified => "MODIFIED",
        EntryStatus::Deleted => "DELETED",
        EntryStatus::Clean => "CLEAN",
        EntryStatus::Error => "ERROR",
        EntryStatus::GitOperation => "REFRESH",
    };

    if cli.no_color {
        println!("[{}] {} {}", time_str, label, display_path(entry, root));
    } else {
        let color = match status {
            EntryStatus::New => "\x1b[32m",      // Green
            EntryStatus::Modified => "\x1b[33m", // Yellow
            EntryStatus::Deleted | EntryStatus::Error => "\x1b[31m",
            EntryStatus::Clean => "\x1b[2m",     // Dim
            EntryStatus::GitOperation => "\x1b[35m",
        };
        println!("[{}] {}{}\x1b[0m {}", time_str, color, label, display_path(entry, root));
    }

    if !entry.error.is_empty() {
        println!("  {}", entry.error);
    }

    for line in entry.diff.lines().take(10) {
        if cli.no_color {
            println!("  {}", line);
        } else if line.starts_with('+') && !line.starts_with("+++") {
            println!("  \x1b[32m{}\x1b[0m", line);
        } else if line.starts_with('-') && !line.starts_with("---") {
            println!("  \x1b[31m{}\x1b[0m", line);
        } else {
            println!("  {}", line);
        }
    }

    println!();
}

fn print_compact_entry(entry: &DiffEntry, root: &Path) {
    let marker = match entry.status() {
        EntryStatus::New => "N",
        EntryStatus::Modified => "M",
        EntryStatus::Deleted => "D",
        EntryStatus::Clean => "C",
        EntryStatus::Error => "E",
        EntryStatus::GitOperation => {
            println!("R *");
            return;
        }
    };

    println!("{} {}", marker, display_path(entry, root));
}
