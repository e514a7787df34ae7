pub mod errors;
pub mod object_schema;
pub mod property;
pub mod property_type;

pub use errors::SchemaError;
pub use object_schema::ObjectSchema;
pub use property::Property;
pub use property_type::{string_for_property_type, PropertyFlags, PropertyKind, PropertyType};
