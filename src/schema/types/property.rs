use serde::{Deserialize, Serialize};

use super::property_type::{string_for_property_type, PropertyFlags, PropertyKind, PropertyType};

/// One field of an object schema.
///
/// `table_column` is assigned by the owning realm when the schema is matched
/// against the stored one and is not part of a property's identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub property_type: PropertyType,
    /// Target object type for links, empty otherwise.
    #[serde(default)]
    pub object_type: String,
    /// Forward property on the target type, only for linking objects.
    #[serde(default)]
    pub link_origin_property_name: String,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub is_indexed: bool,
    #[serde(default)]
    pub is_nullable: bool,
    #[serde(skip)]
    pub table_column: Option<usize>,
}

impl Property {
    #[must_use]
    pub fn new(name: impl Into<String>, property_type: impl Into<PropertyType>) -> Self {
        let property_type = property_type.into();
        Self {
            name: name.into(),
            is_nullable: property_type.is_nullable(),
            is_indexed: property_type.is_indexed(),
            property_type,
            object_type: String::new(),
            link_origin_property_name: String::new(),
            is_primary: false,
            table_column: None,
        }
    }

    /// To-one link to `object_type`.
    #[must_use]
    pub fn link(name: impl Into<String>, object_type: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Object | PropertyFlags::NULLABLE)
            .with_object_type(object_type)
    }

    /// To-many link to `object_type`.
    #[must_use]
    pub fn list(name: impl Into<String>, object_type: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Object | PropertyFlags::ARRAY).with_object_type(object_type)
    }

    /// Reverse link over `object_type.origin_property`.
    #[must_use]
    pub fn linking_objects(
        name: impl Into<String>,
        object_type: impl Into<String>,
        origin_property: impl Into<String>,
    ) -> Self {
        let mut property = Self::new(name, PropertyKind::LinkingObjects)
            .with_object_type(object_type);
        property.link_origin_property_name = origin_property.into();
        property
    }

    pub fn with_object_type(mut self, object_type: impl Into<String>) -> Self {
        self.object_type = object_type.into();
        self
    }

    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.is_indexed = true;
        self.property_type |= PropertyFlags::INDEXED;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.is_nullable = true;
        self.property_type |= PropertyFlags::NULLABLE;
        self
    }

    pub fn requires_index(&self) -> bool {
        self.is_primary || self.is_indexed
    }

    pub fn is_indexable(&self) -> bool {
        self.property_type == PropertyKind::Int
            || self.property_type == PropertyKind::Bool
            || self.property_type == PropertyKind::Date
            || self.property_type == PropertyKind::String
    }

    /// Arrays of objects are never nullable as a whole.
    pub fn type_is_nullable(&self) -> bool {
        !(self.property_type.is_array() && self.property_type == PropertyKind::Object)
    }

    pub fn type_string(&self) -> String {
        let ty = self.property_type;
        if ty.is_array() && ty == PropertyKind::Object {
            return format!("array<{}>", self.object_type);
        }
        match ty.kind() {
            PropertyKind::Object => format!("<{}>", self.object_type),
            PropertyKind::LinkingObjects => format!("linking objects<{}>", self.object_type),
            _ => string_for_property_type(ty).to_string(),
        }
    }
}

// table_column is not compared; cheaper checks first.
impl PartialEq for Property {
    fn eq(&self, other: &Self) -> bool {
        self.property_type == other.property_type
            && self.is_primary == other.is_primary
            && self.is_nullable == other.is_nullable
            && self.requires_index() == other.requires_index()
            && self.name == other.name
            && self.object_type == other.object_type
            && self.link_origin_property_name == other.link_origin_property_name
    }
}

impl Eq for Property {}
