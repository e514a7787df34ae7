use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::{ConfigError, ConfigResult};
use crate::error::SyncPermissionsResult;

/// Settings of a [`Permissions`](crate::permissions::Permissions) manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PermissionsConfig {
    /// Upper bound on opening a hidden realm, including the initial download.
    pub open_timeout_ms: u64,
    /// Maximum number of hidden realm handles kept in the cache. The least
    /// recently used entry is dropped when the cache is full.
    pub cache_capacity: usize,
    /// Directory used by the local realm opener for on-disk realms.
    pub storage_root: Option<PathBuf>,
    pub logging: LogConfig,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            open_timeout_ms: 30_000,
            cache_capacity: 16,
            storage_root: None,
            logging: LogConfig::default(),
        }
    }
}

impl PermissionsConfig {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        let config: PermissionsConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates the TOML file at `path`.
    pub fn load(path: impl AsRef<Path>) -> SyncPermissionsResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::from)?;
        Ok(Self::from_toml_str(&contents)?)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.open_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "open_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::Validation(
                "cache_capacity must be greater than zero".to_string(),
            ));
        }
        self.logging.validate()
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Default log level for all modules
    pub default_level: String,
    /// Per-feature overrides keyed by feature name (`permissions`, `realm`, ...)
    pub features: HashMap<String, String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: "INFO".to_string(),
            features: HashMap::new(),
        }
    }
}

impl LogConfig {
    pub fn level_filter(level: &str) -> Option<log::LevelFilter> {
        match level.to_ascii_uppercase().as_str() {
            "TRACE" => Some(log::LevelFilter::Trace),
            "DEBUG" => Some(log::LevelFilter::Debug),
            "INFO" => Some(log::LevelFilter::Info),
            "WARN" => Some(log::LevelFilter::Warn),
            "ERROR" => Some(log::LevelFilter::Error),
            "OFF" => Some(log::LevelFilter::Off),
            _ => None,
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let levels = std::iter::once(&self.default_level).chain(self.features.values());
        for level in levels {
            if Self::level_filter(level).is_none() {
                return Err(ConfigError::Validation(format!("unknown log level '{}'", level)));
            }
        }
        Ok(())
    }
}
