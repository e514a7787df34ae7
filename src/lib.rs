//! # sync_permissions
//!
//! Permission management for sync-capable realms together with the schema
//! type model the permission records are described with.
//!
//! * [`schema`]: property types, properties and object schemas
//! * [`realm`]: the local realm engine with live, notifying query results
//! * [`permissions`]: the [`Permissions`] manager and [`PermissionResults`]
//! * [`config`] and [`logging`]: ambient settings and log targets

#[macro_use]
pub mod logging;

pub mod config;
pub mod error;
pub mod permissions;
pub mod realm;
pub mod schema;

pub use config::{ConfigError, LogConfig, PermissionsConfig};
pub use error::{SyncPermissionsError, SyncPermissionsResult};
pub use permissions::{
    AccessLevel, ChangeStage, ChangeStatus, Condition, ConfigMaker, OperationHandle,
    OperationState, Permission, PermissionChangeError, PermissionChangeTicket, PermissionResults,
    PermissionResultsError, Permissions,
};
pub use realm::{
    LocalRealmOpener, NotificationToken, Query, Realm, RealmConfig, RealmError, RealmOpener,
    RealmResult, Results, SharedRealm, SyncUser,
};
pub use schema::{
    string_for_property_type, ObjectSchema, Property, PropertyFlags, PropertyKind, PropertyType,
    SchemaError,
};
