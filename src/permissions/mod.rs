//! Permission management for sync users.
//!
//! [`Permissions`] reads a user's effective grants from their permission
//! realm as live [`PermissionResults`] and submits grant and revoke requests
//! to their management realm. Both realms are cached per user in a
//! [`RealmCache`] owned by the manager.

pub mod error;
pub mod permission_manager;
pub mod permission_results;
pub mod realm_cache;
pub mod types;

pub use error::{ChangeStage, PermissionChangeError, PermissionResultsError};
pub use permission_manager::{
    management_realm_url, permission_realm_url, ConfigMaker, OperationHandle, OperationKind,
    OperationState, PermissionChangeResult, Permissions,
};
pub use permission_results::{PermissionResults, PermissionResultsResult};
pub use realm_cache::{HiddenRealm, RealmCache};
pub use types::{
    AccessLevel, ChangeStatus, Condition, Permission, PermissionChangeRecord,
    PermissionChangeTicket, PermissionRecord, PERMISSION_CHANGE_TABLE, PERMISSION_TABLE,
};
