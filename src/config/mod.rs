//! Configuration for the permission layer.
//!
//! Settings are read from TOML; every key has a default so partial files are
//! accepted.

pub mod error;
pub mod permissions_config;

pub use error::{ConfigError, ConfigResult};
pub use permissions_config::{LogConfig, PermissionsConfig};
