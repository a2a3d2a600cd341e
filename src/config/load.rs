//! Config file loading and environment overrides.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{Config, ConfigLayer};

pub const CONFIG_FILE: &str = "git-storage.toml";

fn config_error(reason: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, reason)
}

/// Parse one TOML layer, `None` if the file does not exist.
pub fn load_from(path: &Path) -> io::Result<Option<ConfigLayer>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)
        .map_err(|e| config_error(format!("failed to read {}: {e}", path.display())))?;
    toml::from_str(&contents)
        .map(Some)
        .map_err(|e| config_error(format!("failed to parse {}: {e}", path.display())))
}

/// Resolve the effective config: defaults, then `./git-storage.toml` if
/// present, then environment overrides.
pub fn load() -> Config {
    let mut config = Config::default();
    match load_from(&PathBuf::from(CONFIG_FILE)) {
        Ok(Some(layer)) => layer.apply_to(&mut config),
        Ok(None) => {}
        Err(err) => {
            tracing::warn!("config load failed, using defaults: {err}");
        }
    }
    apply_env_overrides(&mut config);
    config
}

pub fn apply_env_overrides(config: &mut Config) {
    if let Ok(raw) = std::env::var("GIT_STORAGE_URL") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            config.repo_url = Some(trimmed.to_string());
        }
    }
    if let Ok(raw) = std::env::var("GIT_STORAGE_BRANCH") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            config.branch = trimmed.to_string();
        }
    }
    if let Ok(raw) = std::env::var("GIT_STORAGE_TOKEN") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            config.token = Some(trimmed.to_string());
        }
    }
    if let Ok(raw) = std::env::var("GIT_STORAGE_DATA_DIR") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            config.data_dir = PathBuf::from(trimmed);
        }
    }
    if std::env::var_os("GIT_STORAGE_NO_AUTO_SYNC").is_some() {
        config.auto_sync = false;
    }
}

/// Atomic write: render next to the target, then rename over it.
pub fn write_config(path: &Path, config: &Config) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| config_error("config path missing parent directory".to_string()))?;
    fs::create_dir_all(dir)?;
    let contents = toml::to_string_pretty(config)
        .map_err(|e| config_error(format!("failed to render config: {e}")))?;
    let temp = tempfile::NamedTempFile::new_in(dir)?;
    fs::write(temp.path(), contents.as_bytes())?;
    temp.persist(path)
        .map_err(|e| config_error(format!("failed to persist {}: {e}", path.display())))?;
    Ok(())
}
