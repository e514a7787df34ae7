//! Schema type model.
//!
//! Object schemas are lists of [`Property`] descriptors whose types are
//! encoded as [`PropertyType`] values: a base kind plus `Indexed`, `Nullable`
//! and `Array` modifiers. Schema comparison matches properties on their base
//! kind and semantic flags only.

pub mod types;

pub use types::{
    string_for_property_type, ObjectSchema, Property, PropertyFlags, PropertyKind, PropertyType,
    SchemaError,
};
