use thiserror::Error;

use crate::schema::SchemaError;

/// Errors raised by the local realm engine and by realm openers.
///
/// Sync and authentication failures are kept apart from local I/O failures
/// so callers can tell a network problem from a broken store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RealmError {
    #[error("Storage error: {0}")]
    Io(String),

    #[error("Invalid realm configuration: {0}")]
    Config(String),

    #[error("Sync error: {0}")]
    Sync(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Object type '{0}' is not part of this realm")]
    UnknownTable(String),

    #[error("Object '{key}' not found in '{table}'")]
    ObjectNotFound { table: String, key: String },

    #[error("Index {index} is out of bounds (size {size})")]
    IndexOutOfBounds { index: usize, size: usize },

    #[error("Realm has been closed")]
    Closed,
}

impl From<sled::Error> for RealmError {
    fn from(error: sled::Error) -> Self {
        RealmError::Io(error.to_string())
    }
}

impl From<serde_json::Error> for RealmError {
    fn from(error: serde_json::Error) -> Self {
        RealmError::Serialization(error.to_string())
    }
}

/// Result type for realm operations
pub type RealmResult<T> = Result<T, RealmError>;
