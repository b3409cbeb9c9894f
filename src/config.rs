//! Configuration management for vibewatch
//!
//! Settings come from built-in defaults, an optional TOML file and
//! `VIBEWATCH_*` environment variables, in that order of precedence.

use std::path::Path;
use std::time::Duration;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Global configuration for vibewatch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VibewatchConfig {
    /// Event coalescing configuration
    pub watcher: WatcherConfig,
    /// Diff cache configuration
    pub cache: CacheConfig,
    /// Diff rendering configuration
    pub diff: DiffConfig,
}

/// Configuration for the event coalescer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Quiet period after the last event before a batch is flushed
    pub batch_interval_ms: u64,
    /// Capacity of the changed-path output queue
    pub channel_capacity: usize,
}

/// Configuration for the per-repository diff cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long a cached diff is trusted without asking git again
    pub freshness_ms: u64,
    /// Maximum number of cached paths per repository
    pub capacity: usize,
}

/// Configuration for diffs requested from git
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    /// Lines of context around each hunk
    pub context_lines: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            batch_interval_ms: 100,
            channel_capacity: 64,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            freshness_ms: 1000,
            capacity: 4096,
        }
    }
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self { context_lines: 3 }
    }
}

impl WatcherConfig {
    /// Get batch flush interval
    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }
}

impl CacheConfig {
    /// Get cache freshness window
    pub fn freshness(&self) -> Duration {
        Duration::from_millis(self.freshness_ms)
    }
}

fn env_override<T, F>(lookup: &F, name: &str, target: &mut T)
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup(name) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!("Ignoring unparseable {}={:?}", name, val),
        }
    }
}

/// Configuration loading and management
impl VibewatchConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Load configuration from file when given, else use defaults
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from environment variables if present
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Override fields from `VIBEWATCH_*` values returned by `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        env_override(&lookup, "VIBEWATCH_BATCH_INTERVAL_MS", &mut self.watcher.batch_interval_ms);
        env_override(&lookup, "VIBEWATCH_CHANNEL_CAPACITY", &mut self.watcher.channel_capacity);
        env_override(&lookup, "VIBEWATCH_CACHE_FRESHNESS_MS", &mut self.cache.freshness_ms);
        env_override(&lookup, "VIBEWATCH_CACHE_CAPACITY", &mut self.cache.capacity);
        env_override(&lookup, "VIBEWATCH_CONTEXT_LINES", &mut self.diff.context_lines);
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.watcher.batch_interval_ms == 0 {
            return Err("batch_interval_ms must be greater than 0".to_string());
        }

        if self.watcher.channel_capacity == 0 {
            return Err("channel_capacity must be greater than 0".to_string());
        }

        if self.cache.freshness_ms == 0 {
            return Err("freshness_ms must be greater than 0".to_string());
        }

        if self.cache.capacity == 0 {
            return Err("cache capacity must be greater than 0".to_string());
        }

        Ok(())
    }
}
