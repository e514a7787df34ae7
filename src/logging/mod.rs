//! # Logging
//!
//! The crate logs through the `log` facade under per-feature targets (see
//! [`features`]). Applications bring their own logger; [`LoggingSystem::init`]
//! is a convenience that installs `env_logger` configured from [`LogConfig`].

#[macro_use]
pub mod features;

use crate::config::LogConfig;
use crate::error::SyncPermissionsResult;
use features::LogFeature;
use once_cell::sync::OnceCell;

/// Outcome of the first [`LoggingSystem::init`].
static LOGGING_INITIALIZED: OnceCell<Result<(), String>> = OnceCell::new();

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Logger already installed: {0}")]
    AlreadyInstalled(String),
}

pub struct LoggingSystem;

impl LoggingSystem {
    /// Installs `env_logger` with the configured levels. `RUST_LOG`, when set,
    /// takes precedence. Only the first call installs anything; later calls
    /// return the first call's outcome.
    pub fn init(config: &LogConfig) -> SyncPermissionsResult<()> {
        let outcome = LOGGING_INITIALIZED.get_or_init(|| {
            let mut builder = env_logger::Builder::new();
            builder.filter_level(
                LogConfig::level_filter(&config.default_level).unwrap_or(log::LevelFilter::Info),
            );
            for feature in LogFeature::ALL {
                if let Some(level) = config
                    .features
                    .get(feature.name())
                    .and_then(|level| LogConfig::level_filter(level))
                {
                    builder.filter_module(feature.target(), level);
                }
            }
            if let Ok(spec) = std::env::var("RUST_LOG") {
                builder.parse_filters(&spec);
            }
            builder.try_init().map_err(|e| e.to_string())
        });
        outcome
            .clone()
            .map_err(|e| LoggingError::AlreadyInstalled(e).into())
    }

    /// Installs a logger suitable for tests; ignores an already installed one.
    pub fn init_for_tests() {
        let _ = env_logger::builder().is_test(true).try_init();
    }
}
