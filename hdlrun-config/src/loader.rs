use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::snapshot::ConfigSnapshot;

/// File name searched for in the workspace and its ancestors.
pub const CONFIG_FILE_NAME: &str = "hdlrun.toml";

/// Environment variable pointing at an explicit configuration file.
pub const CONFIG_PATH_ENV: &str = "HDLRUN_CONFIG_PATH";

/// A loaded configuration and where it came from.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config: ConfigSnapshot,
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Load from `HDLRUN_CONFIG_PATH` when set, otherwise search upward from
    /// the current directory.
    pub fn load() -> Result<Self> {
        if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
            let trimmed = config_path.trim();
            if !trimmed.is_empty() {
                return Self::load_from_file(trimmed).with_context(|| {
                    format!("Failed to load configuration from {CONFIG_PATH_ENV}={trimmed}")
                });
            }
        }

        Self::load_from_workspace(std::env::current_dir()?)
    }

    /// Use the nearest `hdlrun.toml` at or above `start`; defaults when none
    /// exists.
    pub fn load_from_workspace(start: impl AsRef<Path>) -> Result<Self> {
        match find_config_file(start.as_ref()) {
            Some(path) => Self::load_from_file(path),
            None => {
                tracing::debug!(start = %start.as_ref().display(), "no configuration file found, using defaults");
                Ok(Self {
                    config: ConfigSnapshot::default(),
                    config_path: None,
                })
            }
        }
    }

    /// Load a specific file. A missing file is an error here.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        let mut config = parse_config(&content)
            .with_context(|| format!("Failed to parse configuration file {}", path.display()))?;
        config.normalize();
        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded configuration");

        Ok(Self {
            config,
            config_path: Some(path.to_path_buf()),
        })
    }

    pub fn config(&self) -> &ConfigSnapshot {
        &self.config
    }

    pub fn into_config(self) -> ConfigSnapshot {
        self.config
    }

    /// Path of the file the configuration was read from, if any.
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}

/// Parse TOML text into a snapshot, filling omitted keys with defaults.
pub fn parse_config(content: &str) -> Result<ConfigSnapshot> {
    let config: ConfigSnapshot = toml::from_str(content)?;
    Ok(config)
}

/// Render a snapshot back to TOML.
pub fn render_config(config: &ConfigSnapshot) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize configuration")
}

/// Find `hdlrun.toml` in `start_path` or any parent directory.
pub fn find_config_file(start_path: &Path) -> Option<PathBuf> {
    let mut current = start_path.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.is_file() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}
