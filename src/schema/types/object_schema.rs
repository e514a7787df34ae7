use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::SchemaError;
use super::property::Property;
use super::property_type::PropertyKind;

/// Schema of one object type (one table).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectSchema {
    pub name: String,
    pub properties: Vec<Property>,
}

impl ObjectSchema {
    pub fn new(name: impl Into<String>, properties: Vec<Property>) -> Self {
        Self {
            name: name.into(),
            properties,
        }
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn primary_key(&self) -> Option<&Property> {
        self.properties.iter().find(|p| p.is_primary)
    }

    /// Checks internal consistency: unique names, at most one primary key,
    /// link targets where required, indexes only on indexable types.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut seen = std::collections::HashSet::new();
        for property in &self.properties {
            if !seen.insert(property.name.as_str()) {
                return Err(SchemaError::InvalidProperty(format!(
                    "{}.{} is declared twice",
                    self.name, property.name
                )));
            }
            let links = property.property_type == PropertyKind::Object
                || property.property_type == PropertyKind::LinkingObjects;
            if links && property.object_type.is_empty() {
                return Err(SchemaError::InvalidProperty(format!(
                    "{}.{} of type {} requires an object type",
                    self.name,
                    property.name,
                    property.property_type
                )));
            }
            if property.property_type == PropertyKind::LinkingObjects
                && property.link_origin_property_name.is_empty()
            {
                return Err(SchemaError::InvalidProperty(format!(
                    "{}.{} requires an origin property",
                    self.name, property.name
                )));
            }
            if property.requires_index() && !property.is_indexable() {
                return Err(SchemaError::InvalidProperty(format!(
                    "{}.{} of type {} cannot be indexed",
                    self.name,
                    property.name,
                    property.type_string()
                )));
            }
        }
        if self.properties.iter().filter(|p| p.is_primary).count() > 1 {
            return Err(SchemaError::InvalidProperty(format!(
                "{} declares more than one primary key",
                self.name
            )));
        }
        Ok(())
    }

    /// Differences between this (local) schema and the stored one, described
    /// for humans. Empty when both match.
    pub fn compare(&self, stored: &ObjectSchema) -> Vec<String> {
        let mut differences = Vec::new();
        for local in &self.properties {
            match stored.property(&local.name) {
                None => differences.push(format!("property '{}' was added", local.name)),
                Some(existing) if existing != local => differences.push(format!(
                    "property '{}' changed from {} to {}",
                    local.name,
                    existing.type_string(),
                    local.type_string()
                )),
                Some(_) => {}
            }
        }
        for existing in &stored.properties {
            if self.property(&existing.name).is_none() {
                differences.push(format!("property '{}' was removed", existing.name));
            }
        }
        differences
    }

    /// Takes the storage columns from the stored schema's property order.
    pub fn assign_columns(&mut self, stored: &ObjectSchema) {
        for property in &mut self.properties {
            property.table_column = stored
                .properties
                .iter()
                .position(|p| p.name == property.name);
        }
    }

    /// Value of the primary key of `record`, rendered as a storage key.
    pub fn primary_key_of(&self, record: &Value) -> Result<Option<String>, SchemaError> {
        let Some(primary) = self.primary_key() else {
            return Ok(None);
        };
        match record.get(&primary.name) {
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            _ => Err(SchemaError::InvalidData(format!(
                "{}.{} is the primary key and must be set",
                self.name, primary.name
            ))),
        }
    }

    /// Validates one record against this schema.
    pub fn validate_record(&self, record: &Value) -> Result<(), SchemaError> {
        let Value::Object(fields) = record else {
            return Err(SchemaError::InvalidData(format!(
                "{} records must be objects",
                self.name
            )));
        };
        for key in fields.keys() {
            if self.property(key).is_none() {
                return Err(SchemaError::InvalidData(format!(
                    "{} has no property '{}'",
                    self.name, key
                )));
            }
        }
        for property in &self.properties {
            if property.property_type == PropertyKind::LinkingObjects {
                if fields.contains_key(&property.name) {
                    return Err(SchemaError::InvalidData(format!(
                        "{}.{} is computed and cannot be written",
                        self.name, property.name
                    )));
                }
                continue;
            }
            self.validate_value(property, fields.get(&property.name))?;
        }
        Ok(())
    }

    fn validate_value(&self, property: &Property, value: Option<&Value>) -> Result<(), SchemaError> {
        let ty = property.property_type;
        if ty.is_array() {
            return match value {
                None | Some(Value::Null) => Ok(()),
                Some(Value::Array(items)) => items
                    .iter()
                    .try_for_each(|item| self.validate_element(property, item)),
                Some(other) => Err(self.type_error(property, other)),
            };
        }
        match value {
            None | Some(Value::Null) => {
                let optional = !property.is_primary
                    && (property.is_nullable || ty.kind() == PropertyKind::Object);
                if optional {
                    Ok(())
                } else {
                    Err(SchemaError::InvalidData(format!(
                        "{}.{} is required",
                        self.name, property.name
                    )))
                }
            }
            Some(v) => self.validate_element(property, v),
        }
    }

    fn validate_element(&self, property: &Property, value: &Value) -> Result<(), SchemaError> {
        if value.is_null() {
            if property.is_nullable || property.property_type == PropertyKind::Object {
                return Ok(());
            }
            return Err(self.type_error(property, value));
        }
        let matches = match property.property_type.kind() {
            PropertyKind::Int => value.is_i64() || value.is_u64(),
            PropertyKind::Bool => value.is_boolean(),
            PropertyKind::String | PropertyKind::Data => value.is_string(),
            PropertyKind::Date => value
                .as_str()
                .map(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok())
                .unwrap_or(false),
            PropertyKind::Float | PropertyKind::Double => value.is_number(),
            PropertyKind::Object => value.is_string() || value.is_number(),
            PropertyKind::LinkingObjects => false,
            PropertyKind::Any => true,
        };
        if matches {
            Ok(())
        } else {
            Err(self.type_error(property, value))
        }
    }

    fn type_error(&self, property: &Property, value: &Value) -> SchemaError {
        SchemaError::InvalidData(format!(
            "{}.{} expects {}, got {}",
            self.name,
            property.name,
            property.type_string(),
            value
        ))
    }
}
