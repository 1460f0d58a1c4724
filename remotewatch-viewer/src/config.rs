//! Viewer configuration
//!
//! Layers, lowest to highest priority:
//! - Built-in defaults
//! - TOML file (`$REMOTEWATCH_CONFIG`, else `<config dir>/remotewatch/config.toml`)
//! - Environment (`REMOTEWATCH_BASE_URL`, `REMOTEWATCH_POLL_INTERVAL_SECS`)
//! - Command line flags (applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::aligner::{AlignOptions, AlignPolicy};
use crate::error::ConfigError;
use crate::merger::{DuplicatePolicy, MergeOptions};

pub const CONFIG_PATH_ENV: &str = "REMOTEWATCH_CONFIG";
pub const BASE_URL_ENV: &str = "REMOTEWATCH_BASE_URL";
pub const INTERVAL_ENV: &str = "REMOTEWATCH_POLL_INTERVAL_SECS";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub backend: BackendConfig,
    pub polling: PollingConfig,
    pub merge: MergeConfig,
    pub history: HistoryConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub devices_path: String,
    pub usage_path: String,
    /// Deadline applied to each request
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub duplicates: DuplicatePolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub policy: AlignPolicy,
    pub check_timestamps: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub dark_mode: bool,
    /// Aligned samples shown for an expanded device (most recent last)
    pub history_rows: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            devices_path: "/api/devices".to_string(),
            usage_path: "/api/usage".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_secs: 20 }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { dark_mode: false, history_rows: 10 }
    }
}

impl BackendConfig {
    pub fn devices_url(&self) -> String {
        join_url(&self.base_url, &self.devices_path)
    }

    pub fn usage_url(&self) -> String {
        join_url(&self.base_url, &self.usage_path)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

impl ViewerConfig {
    /// Resolve the config file, apply environment overrides and validate.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
            .or_else(|| Self::config_file_path().filter(|p| p.exists()));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Environment overrides; `lookup` is injectable for tests
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.backend.base_url = url;
        }
        if let Some(raw) = lookup(INTERVAL_ENV) {
            self.polling.interval_secs = raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{INTERVAL_ENV} must be a number of seconds, got {raw:?}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.polling.interval_secs == 0 {
            return Err(ConfigError::Invalid("polling.interval_secs must be > 0".into()));
        }
        if self.backend.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("backend.request_timeout_secs must be > 0".into()));
        }
        reqwest::Url::parse(&self.backend.base_url).map_err(|e| {
            ConfigError::Invalid(format!("backend.base_url {:?}: {}", self.backend.base_url, e))
        })?;
        Ok(())
    }

    /// Write this config as TOML, creating parent directories
    pub async fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// OS-specific default location
    pub fn config_file_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir()?;
        path.push("remotewatch");
        path.push("config.toml");
        Some(path)
    }

    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            duplicates: self.merge.duplicates,
            alignment: AlignOptions {
                policy: self.history.policy,
                check_timestamps: self.history.check_timestamps,
            },
        }
    }
}
