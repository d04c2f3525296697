//! Configuration for the localscan host scanner.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{DiscoverError, Result};

/// Environment prefix: `LOCALSCAN_DISCOVER__WORKERS=50` sets `discover.workers`.
const ENV_PREFIX: &str = "LOCALSCAN";

/// Top-level discover configuration.
///
/// Loaded from `localscan.toml` `[discover]` section or
/// `LOCALSCAN_DISCOVER__` environment variables. Command-line flags win.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverConfig {
    /// Per-step probe timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Number of concurrent probe workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Refuse to scan networks with more usable hosts than this (a /16).
    #[serde(default = "default_max_hosts")]
    pub max_hosts: u64,

    /// Output format when none is given on the command line.
    #[serde(default)]
    pub format: OutputFormat,

    /// Baseline location for diff mode (default: `~/.localscan/last.json`).
    #[serde(default)]
    pub history_path: Option<PathBuf>,
}

impl DiscoverConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// How final results are rendered.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Bordered text table.
    #[default]
    Table,
    /// Pretty-printed JSON array.
    Json,
    /// Comma-separated values with a header row.
    Csv,
}

impl FromStr for OutputFormat {
    type Err = DiscoverError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            _ => Err(DiscoverError::UnknownFormat(s.to_string())),
        }
    }
}

fn default_timeout_ms() -> u64 {
    500
}

fn default_workers() -> usize {
    100
}

fn default_max_hosts() -> u64 {
    65_534
}

/// Load the `[discover]` section from `<file_prefix>.{toml,json,yaml,...}`
/// (optional) overlaid with environment variables.
///
/// A missing section yields the defaults; a present but invalid one is an error.
pub fn load_discover_config(file_prefix: &str) -> Result<DiscoverConfig> {
    let cfg = ::config::Config::builder()
        .add_source(::config::File::with_name(file_prefix).required(false))
        .add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| DiscoverError::Config(e.to_string()))?;

    match cfg.get::<DiscoverConfig>("discover") {
        Ok(c) => Ok(c),
        Err(::config::ConfigError::NotFound(_)) => Ok(DiscoverConfig::default()),
        Err(e) => Err(DiscoverError::Config(e.to_string())),
    }
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            workers: default_workers(),
            max_hosts: default_max_hosts(),
            format: OutputFormat::default(),
            history_path: None,
        }
    }
}
