use std::path::PathBuf;
use anyhow::Result;
use clap::{Parser, ValueEnum};
use crate::config::VibewatchConfig;

#[derive(Parser)]
#[command(name = "vibewatch")]
#[command(version)]
#[command(about = "Streams classified git diffs for every file you touch")]
#[command(long_about = "vibewatch watches a git repository, or a directory holding several, and prints the diff of each file as soon as it changes. Commits, checkouts and resets trigger a full refresh of the dirty-file list.")]
pub struct Cli {
    /// Directory to watch for changes
    #[arg(value_name = "PATH", help = "Repository or parent directory to watch (defaults to current directory)")]
    pub path: Option<PathBuf>,

    /// Configuration file
    #[arg(long, value_name = "FILE", help = "TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "text", help = "Output format")]
    pub output: OutputFormat,

    /// Diff context lines
    #[arg(long, value_name = "N", help = "Number of context lines in diffs")]
    pub context: Option<usize>,

    /// Quiet period before a batch of changes is emitted
    #[arg(long, value_name = "MS", help = "Batch interval in ms")]
    pub batch_ms: Option<u64>,

    /// Disable colors in output
    #[arg(long, help = "Disable colored output")]
    pub no_color: bool,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Plain text with the first lines of each diff
    Text,
    /// One JSON object per entry, for scripting
    Json,
    /// Compact single-line format
    Compact,
}

impl Cli {
    pub fn get_watch_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        })
    }

    /// Defaults, then the config file, then `VIBEWATCH_*` variables, then flags.
    pub fn resolve_config(&self) -> Result<VibewatchConfig> {
        self.resolve_config_with(|name| std::env::var(name).ok())
    }

    /// Like [`Cli::resolve_config`], reading variables through `lookup`.
    pub fn resolve_config_with<F>(&self, lookup: F) -> Result<VibewatchConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = VibewatchConfig::load_or_default(self.config.as_ref())?;
        config.apply_overrides(lookup);

        if let Some(context) = self.context {
            config.diff.context_lines = context;
        }
        if let Some(batch_ms) = self.batch_ms {
            config.watcher.batch_interval_ms = batch_ms;
        }

        Ok(config)
    }

    pub fn setup_logging(&self) {
        let level = if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        };

        // stdout carries the entries
        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }

    pub fn validate(&self) -> Result<(), String> {
        let path = self.get_watch_path();

        if !path.exists() {
            return Err(format!("Path does not exist: {}", path.display()));
        }

        if !path.is_dir() {
            return Err(format!("Path is not a directory: {}", path.display()));
        }

        if self.batch_ms == Some(0) {
            return Err("Batch interval must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            path: None,
            config: None,
            output: OutputFormat::Text,
            context: None,
            batch_ms: None,
            no_color: false,
            verbose: false,
        }
    }
}
