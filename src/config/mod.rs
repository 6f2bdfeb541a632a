//! Configuration loading for Buildwright
//!
//! A missing file means defaults. A present file is parsed, then checked
//! for values that would only fail later, deep inside a request.

pub mod schema;

pub use schema::{Config, RunMode};

use crate::environment::validate_identifier;
use crate::error::{BuildwrightError, BuildwrightResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

const LOG_FORMATS: [&str; 2] = ["text", "json"];

/// Locates, reads and writes the config file
pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    /// Manager for `~/.config/buildwright/config.toml`
    pub fn new() -> Self {
        Self::with_path(Self::default_config_path())
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("buildwright")
            .join("config.toml")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and validate the config, or return defaults if there is no file
    pub async fn load(&self) -> BuildwrightResult<Config> {
        if !self.path.exists() {
            debug!("No config at {}, using defaults", self.path.display());
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&self.path).await.map_err(|e| {
            BuildwrightError::io(format!("reading config from {}", self.path.display()), e)
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| self.invalid(e.to_string()))?;
        validate(&config).map_err(|reason| self.invalid(reason))?;
        Ok(config)
    }

    /// Write `config` as pretty TOML, creating the directory if needed
    pub async fn save(&self, config: &Config) -> BuildwrightResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| BuildwrightError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.path, content).await.map_err(|e| {
            BuildwrightError::io(format!("writing config to {}", self.path.display()), e)
        })?;

        info!("Configuration saved to {}", self.path.display());
        Ok(())
    }

    fn invalid(&self, reason: String) -> BuildwrightError {
        BuildwrightError::ConfigInvalid {
            path: self.path.clone(),
            reason,
        }
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Reject values that parse but cannot work
fn validate(config: &Config) -> Result<(), String> {
    if !LOG_FORMATS.contains(&config.general.log_format.as_str()) {
        return Err(format!(
            "general.log_format must be one of {}, got '{}'",
            LOG_FORMATS.join(", "),
            config.general.log_format
        ));
    }
    if config.checks.parallel_builds == 0 {
        return Err("checks.parallel_builds must be at least 1".to_string());
    }
    validate_identifier(&config.host.module).map_err(|e| format!("host.module: {e}"))?;
    if config.host.default_version.is_empty() {
        return Err("host.default_version must not be empty".to_string());
    }
    if config.host.binary_name.is_empty() {
        return Err("host.binary_name must not be empty".to_string());
    }
    if config.host.entry_file.is_absolute() {
        return Err("host.entry_file must be relative to the host checkout".to_string());
    }
    let timeouts = &config.timeouts;
    if [
        timeouts.vcs_secs,
        timeouts.resolve_secs,
        timeouts.test_secs,
        timeouts.build_secs,
        timeouts.query_secs,
    ]
    .contains(&0)
    {
        return Err("timeouts must be at least one second".to_string());
    }
    Ok(())
}
