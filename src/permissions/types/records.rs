//! Stored shapes of permission data.
//!
//! The permission realm holds one `Permission` object per effective grant;
//! the management realm holds `PermissionChange` requests that the server
//! processes and annotates with a status.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::permission::{AccessLevel, Condition, Permission};
use crate::schema::{ObjectSchema, Property, PropertyKind};

pub const PERMISSION_TABLE: &str = "Permission";
pub const PERMISSION_CHANGE_TABLE: &str = "PermissionChange";

/// A grant as stored in the permission realm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRecord {
    pub user_id: String,
    pub path: String,
    pub may_read: bool,
    pub may_write: bool,
    pub may_manage: bool,
    pub updated_at: String,
}

impl PermissionRecord {
    pub fn object_schema() -> ObjectSchema {
        ObjectSchema::new(
            PERMISSION_TABLE,
            vec![
                Property::new("userId", PropertyKind::String).indexed(),
                Property::new("path", PropertyKind::String),
                Property::new("mayRead", PropertyKind::Bool),
                Property::new("mayWrite", PropertyKind::Bool),
                Property::new("mayManage", PropertyKind::Bool),
                Property::new("updatedAt", PropertyKind::Date),
            ],
        )
    }

    /// The grant record for `permission`. Stored grants are per user, so a
    /// key/value condition has none.
    pub fn from_permission(permission: &Permission) -> Option<Self> {
        let Condition::UserId(user_id) = &permission.condition else {
            return None;
        };
        let (may_read, may_write, may_manage) = permission.access.to_flags();
        Some(Self {
            user_id: user_id.clone(),
            path: permission.path.clone(),
            may_read,
            may_write,
            may_manage,
            updated_at: timestamp(Utc::now()),
        })
    }

    pub fn access(&self) -> AccessLevel {
        AccessLevel::from_flags(self.may_read, self.may_write, self.may_manage)
    }

    pub fn to_permission(&self) -> Permission {
        Permission::new(
            self.path.clone(),
            self.access(),
            Condition::user_id(self.user_id.clone()),
        )
    }
}

/// A change request as stored in the management realm.
///
/// `status_code` stays empty until the server has processed the request;
/// zero then means success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionChangeRecord {
    pub id: String,
    pub created_at: String,
    pub updated_at: String,
    pub status_code: Option<i64>,
    pub status_message: Option<String>,
    pub user_id: Option<String>,
    pub metadata_key: Option<String>,
    pub metadata_value: Option<String>,
    pub realm_url: String,
    pub may_read: Option<bool>,
    pub may_write: Option<bool>,
    pub may_manage: Option<bool>,
}

impl PermissionChangeRecord {
    pub fn object_schema() -> ObjectSchema {
        ObjectSchema::new(
            PERMISSION_CHANGE_TABLE,
            vec![
                Property::new("id", PropertyKind::String).primary(),
                Property::new("createdAt", PropertyKind::Date),
                Property::new("updatedAt", PropertyKind::Date),
                Property::new("statusCode", PropertyKind::Int).nullable(),
                Property::new("statusMessage", PropertyKind::String).nullable(),
                Property::new("userId", PropertyKind::String).nullable(),
                Property::new("metadataKey", PropertyKind::String).nullable(),
                Property::new("metadataValue", PropertyKind::String).nullable(),
                Property::new("realmUrl", PropertyKind::String),
                Property::new("mayRead", PropertyKind::Bool).nullable(),
                Property::new("mayWrite", PropertyKind::Bool).nullable(),
                Property::new("mayManage", PropertyKind::Bool).nullable(),
            ],
        )
    }

    /// A pending request to give `permission.condition` `access` to `realm_url`.
    pub fn request(permission: &Permission, access: AccessLevel, realm_url: String) -> Self {
        let now = timestamp(Utc::now());
        let (user_id, metadata_key, metadata_value) = match &permission.condition {
            Condition::UserId(user_id) => (Some(user_id.clone()), None, None),
            Condition::KeyValue(key, value) => (None, Some(key.clone()), Some(value.clone())),
        };
        let (may_read, may_write, may_manage) = access.to_flags();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now.clone(),
            updated_at: now,
            status_code: None,
            status_message: None,
            user_id,
            metadata_key,
            metadata_value,
            realm_url,
            may_read: Some(may_read),
            may_write: Some(may_write),
            may_manage: Some(may_manage),
        }
    }

    pub fn condition(&self) -> Option<Condition> {
        match (&self.user_id, &self.metadata_key, &self.metadata_value) {
            (Some(user_id), _, _) => Some(Condition::user_id(user_id.clone())),
            (None, Some(key), Some(value)) => Some(Condition::key_value(key.clone(), value.clone())),
            _ => None,
        }
    }

    pub fn access(&self) -> AccessLevel {
        AccessLevel::from_flags(
            self.may_read.unwrap_or(false),
            self.may_write.unwrap_or(false),
            self.may_manage.unwrap_or(false),
        )
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
