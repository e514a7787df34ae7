use crate::config::ConfigError;
use crate::logging::LoggingError;
use crate::permissions::{PermissionChangeError, PermissionResultsError};
use crate::realm::RealmError;
use crate::schema::SchemaError;
use std::fmt;

/// Unified error type of the crate.
///
/// Each module reports its own error type; this enum collects them for
/// applications that drive several modules and want one error to propagate.
#[derive(Debug)]
pub enum SyncPermissionsError {
    /// Errors of the schema model
    Schema(SchemaError),

    /// Errors of the local realm engine and realm openers
    Realm(RealmError),

    /// Errors delivered by permission operations
    PermissionChange(PermissionChangeError),

    /// Errors of permission result accessors
    PermissionResults(PermissionResultsError),

    /// Errors loading or validating configuration
    Config(ConfigError),

    /// Errors installing the logger
    Logging(LoggingError),
}

impl fmt::Display for SyncPermissionsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schema(err) => write!(f, "Schema error: {}", err),
            Self::Realm(err) => write!(f, "Realm error: {}", err),
            Self::PermissionChange(err) => write!(f, "{}", err),
            Self::PermissionResults(err) => write!(f, "Permission results error: {}", err),
            Self::Config(err) => write!(f, "Configuration error: {}", err),
            Self::Logging(err) => write!(f, "Logging error: {}", err),
        }
    }
}

impl std::error::Error for SyncPermissionsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Schema(err) => Some(err),
            Self::Realm(err) => Some(err),
            Self::PermissionChange(err) => Some(err),
            Self::PermissionResults(err) => Some(err),
            Self::Config(err) => Some(err),
            Self::Logging(err) => Some(err),
        }
    }
}

impl From<SchemaError> for SyncPermissionsError {
    fn from(error: SchemaError) -> Self {
        SyncPermissionsError::Schema(error)
    }
}

impl From<RealmError> for SyncPermissionsError {
    fn from(error: RealmError) -> Self {
        SyncPermissionsError::Realm(error)
    }
}

impl From<PermissionChangeError> for SyncPermissionsError {
    fn from(error: PermissionChangeError) -> Self {
        SyncPermissionsError::PermissionChange(error)
    }
}

impl From<PermissionResultsError> for SyncPermissionsError {
    fn from(error: PermissionResultsError) -> Self {
        SyncPermissionsError::PermissionResults(error)
    }
}

impl From<ConfigError> for SyncPermissionsError {
    fn from(error: ConfigError) -> Self {
        SyncPermissionsError::Config(error)
    }
}

impl From<LoggingError> for SyncPermissionsError {
    fn from(error: LoggingError) -> Self {
        SyncPermissionsError::Logging(error)
    }
}

/// Result type alias for operations that can result in a SyncPermissionsError
pub type SyncPermissionsResult<T> = Result<T, SyncPermissionsError>;
