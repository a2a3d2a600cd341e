//! Store configuration.
//!
//! [`Config`] is the resolved shape; [`ConfigLayer`] is the all-optional
//! partial used both for the TOML file layer and for `Store::set_config`.
//! Overrides apply field-by-field; unset fields keep the base value.

mod load;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use load::{load, load_from, write_config};

pub(crate) const DEFAULT_BRANCH: &str = "main";
pub(crate) const DEFAULT_USERNAME: &str = "git";
const DEFAULT_DEBOUNCE_MS: u64 = 10_000;
const DEFAULT_WRITE_COUNT_THRESHOLD: u64 = 200;
const DEFAULT_WRITE_BYTES_THRESHOLD: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP(S) URL of the shared remote; no remote means local-only.
    pub repo_url: Option<String>,
    pub branch: String,
    pub username: String,
    pub token: Option<String>,
    /// Working copy root; holds `.git` and `data/`.
    pub data_dir: PathBuf,
    pub auto_sync: bool,
    pub sync_on_change: bool,
    /// 0 disables the periodic trigger.
    pub sync_interval_minutes: u64,
    /// Debounce window for change-triggered syncs.
    pub debounce_ms: u64,
    pub history: HistoryConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repo_url: None,
            branch: DEFAULT_BRANCH.to_string(),
            username: DEFAULT_USERNAME.to_string(),
            token: None,
            data_dir: default_data_dir(),
            auto_sync: true,
            sync_on_change: true,
            sync_interval_minutes: 0,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            history: HistoryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("storage")
        .join(".git-storage")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    pub write_count_threshold: u64,
    pub write_bytes_threshold: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            write_count_threshold: DEFAULT_WRITE_COUNT_THRESHOLD,
            write_bytes_threshold: DEFAULT_WRITE_BYTES_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub stdout: bool,
    /// `tracing` EnvFilter directive, e.g. `git_storage=debug`.
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stdout: true,
            filter: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConfigLayer {
    pub repo_url: Option<String>,
    pub branch: Option<String>,
    pub username: Option<String>,
    pub token: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub auto_sync: Option<bool>,
    pub sync_on_change: Option<bool>,
    pub sync_interval_minutes: Option<u64>,
    pub debounce_ms: Option<u64>,
    #[serde(default)]
    pub history: HistoryConfigOverride,
    #[serde(default)]
    pub logging: LoggingConfigOverride,
}

impl ConfigLayer {
    pub fn apply_to(&self, base: &mut Config) {
        if let Some(repo_url) = self.repo_url.as_ref() {
            base.repo_url = Some(repo_url.clone());
        }
        if let Some(branch) = self.branch.as_ref() {
            base.branch = branch.clone();
        }
        if let Some(username) = self.username.as_ref() {
            base.username = username.clone();
        }
        if let Some(token) = self.token.as_ref() {
            base.token = Some(token.clone());
        }
        if let Some(data_dir) = self.data_dir.as_ref() {
            base.data_dir = data_dir.clone();
        }
        if let Some(auto_sync) = self.auto_sync {
            base.auto_sync = auto_sync;
        }
        if let Some(sync_on_change) = self.sync_on_change {
            base.sync_on_change = sync_on_change;
        }
        if let Some(minutes) = self.sync_interval_minutes {
            base.sync_interval_minutes = minutes;
        }
        if let Some(debounce_ms) = self.debounce_ms {
            base.debounce_ms = debounce_ms;
        }
        self.history.apply_to(&mut base.history);
        self.logging.apply_to(&mut base.logging);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HistoryConfigOverride {
    pub enabled: Option<bool>,
    pub write_count_threshold: Option<u64>,
    pub write_bytes_threshold: Option<u64>,
}

impl HistoryConfigOverride {
    pub fn apply_to(&self, target: &mut HistoryConfig) {
        if let Some(enabled) = self.enabled {
            target.enabled = enabled;
        }
        if let Some(value) = self.write_count_threshold {
            target.write_count_threshold = value;
        }
        if let Some(value) = self.write_bytes_threshold {
            target.write_bytes_threshold = value;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfigOverride {
    pub stdout: Option<bool>,
    pub filter: Option<String>,
}

impl LoggingConfigOverride {
    pub fn apply_to(&self, target: &mut LoggingConfig) {
        if let Some(stdout) = self.stdout {
            target.stdout = stdout;
        }
        if let Some(filter) = self.filter.as_ref() {
            target.filter = Some(filter.clone());
        }
    }
}
