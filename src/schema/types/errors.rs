use thiserror::Error;

/// Errors raised while parsing, validating or comparing schemas.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Invalid property type: {0}")]
    InvalidPropertyType(String),

    #[error("Invalid property: {0}")]
    InvalidProperty(String),

    #[error("Schema not found: {0}")]
    NotFound(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Schema mismatch for '{object_type}': {differences:?}")]
    Mismatch {
        object_type: String,
        differences: Vec<String>,
    },
}
