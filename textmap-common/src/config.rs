//! Configuration loading and data folder resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Worker configuration, loaded from a TOML file with compiled defaults.
///
/// Every field has a default so a missing or partial config file still
/// yields a runnable worker.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// How long the worker sleeps between empty queue polls
    pub poll_interval_ms: u64,
    /// Fixed delay applied when a task resubmits itself while an external
    /// dependency is incomplete (polling backoff, not exponential)
    pub retry_delay_ms: u64,
    /// Delivery attempts before a failed message is dead-lettered
    pub max_attempts: u32,
    /// Minimum number of embedded texts required for clustering
    pub min_cluster_texts: usize,
    /// Re-cluster any tree node wider than this; `None` disables subdivision
    pub max_cluster_breadth: Option<usize>,
    /// Number of sentence clusters kept per node summary
    pub summary_top_n: usize,
    /// t-SNE tunables
    pub tsne: TsneConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            retry_delay_ms: 2000,
            max_attempts: 3,
            min_cluster_texts: 2,
            max_cluster_breadth: None,
            summary_top_n: 3,
            tsne: TsneConfig::default(),
        }
    }
}

/// Parameters for the stochastic neighbor embedding step.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TsneConfig {
    pub learning_rate: f64,
    pub perplexity: f64,
    pub iterations: usize,
    /// Fixed seed: identical input sets reduce identically across retries
    pub seed: u64,
}

impl Default for TsneConfig {
    fn default() -> Self {
        Self {
            learning_rate: 200.0,
            perplexity: 30.0,
            iterations: 500,
            seed: 5,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid config {}: {}", path.display(), e)))
    }

    /// Load from an explicit path if given, otherwise the first config file
    /// found in the standard locations, otherwise compiled defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }
        if let Some(path) = default_config_file() {
            return Self::load_from_file(&path);
        }
        Ok(Self::default())
    }
}

/// Data folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable `TEXTMAP_DATA`
/// 3. OS-dependent compiled default (fallback)
pub fn resolve_data_folder(cli_arg: Option<&str>) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }
    if let Ok(path) = std::env::var("TEXTMAP_DATA") {
        return PathBuf::from(path);
    }
    default_data_folder()
}

/// Default configuration file path for the platform, if one exists
fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("textmap").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }
    let system_config = PathBuf::from("/etc/textmap/config.toml");
    if system_config.exists() {
        return Some(system_config);
    }
    None
}

/// OS-dependent default data folder
fn default_data_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("textmap"))
        .unwrap_or_else(|| PathBuf::from("/var/lib/textmap"))
}

/// Database file path within the data folder
pub fn database_path(data_folder: &Path) -> PathBuf {
    data_folder.join("textmap.db")
}
