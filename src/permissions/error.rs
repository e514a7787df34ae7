use std::fmt;
use thiserror::Error;

use crate::realm::RealmError;

/// Which part of a permission operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeStage {
    /// The config maker could not produce a usable configuration.
    Configuration,
    /// The hidden realm could not be opened.
    Open,
    /// The change record could not be written.
    Submit,
    /// The permission records could not be read.
    Query,
    /// The server processed the change and refused it.
    RemoteRejection,
}

impl fmt::Display for ChangeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeStage::Configuration => "configuration",
            ChangeStage::Open => "open",
            ChangeStage::Submit => "submit",
            ChangeStage::Query => "query",
            ChangeStage::RemoteRejection => "remote rejection",
        };
        f.write_str(name)
    }
}

/// Error delivered to permission callbacks: a numeric code, a message and the
/// stage that produced it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Permission {stage} failed ({code}): {message}")]
pub struct PermissionChangeError {
    pub code: i64,
    pub message: String,
    pub stage: ChangeStage,
}

impl PermissionChangeError {
    pub const CONFIGURATION: i64 = 1;
    pub const OPEN: i64 = 2;
    pub const SYNC: i64 = 3;
    pub const AUTH: i64 = 4;
    pub const TIMEOUT: i64 = 5;
    pub const SUBMIT: i64 = 6;
    pub const QUERY: i64 = 7;

    pub fn new(code: i64, message: impl Into<String>, stage: ChangeStage) -> Self {
        Self {
            code,
            message: message.into(),
            stage,
        }
    }

    pub fn configuration(error: &RealmError) -> Self {
        Self::new(Self::CONFIGURATION, error.to_string(), ChangeStage::Configuration)
    }

    /// Maps a failure to open a hidden realm, keeping sync and auth failures
    /// distinguishable by code.
    pub fn open(error: &RealmError) -> Self {
        let code = match error {
            RealmError::Sync(_) => Self::SYNC,
            RealmError::Auth(_) => Self::AUTH,
            RealmError::Timeout(_) => Self::TIMEOUT,
            RealmError::Config(_) => Self::CONFIGURATION,
            _ => Self::OPEN,
        };
        let stage = if code == Self::CONFIGURATION {
            ChangeStage::Configuration
        } else {
            ChangeStage::Open
        };
        Self::new(code, error.to_string(), stage)
    }

    pub fn submit(error: &RealmError) -> Self {
        Self::new(Self::SUBMIT, error.to_string(), ChangeStage::Submit)
    }

    pub fn query(error: &RealmError) -> Self {
        Self::new(Self::QUERY, error.to_string(), ChangeStage::Query)
    }

    pub fn rejected(code: i64, message: impl Into<String>) -> Self {
        Self::new(code, message, ChangeStage::RemoteRejection)
    }
}

/// Errors of [`PermissionResults`](super::PermissionResults) accessors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PermissionResultsError {
    #[error("Index {index} is out of bounds (size {size})")]
    OutOfBounds { index: usize, size: usize },

    #[error(transparent)]
    Realm(RealmError),

    #[error("Malformed permission record: {0}")]
    InvalidRecord(String),
}

impl From<RealmError> for PermissionResultsError {
    fn from(error: RealmError) -> Self {
        match error {
            RealmError::IndexOutOfBounds { index, size } => {
                PermissionResultsError::OutOfBounds { index, size }
            }
            other => PermissionResultsError::Realm(other),
        }
    }
}

impl From<serde_json::Error> for PermissionResultsError {
    fn from(error: serde_json::Error) -> Self {
        PermissionResultsError::InvalidRecord(error.to_string())
    }
}
