//! Common test utilities and fixtures for the permission tests.
#![allow(dead_code)]

use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use sync_permissions::logging::LoggingSystem;
use sync_permissions::permissions::{HiddenRealm, PermissionRecord, PERMISSION_CHANGE_TABLE};
use sync_permissions::{
    ConfigMaker, Permission, PermissionChangeTicket, Permissions, PermissionsConfig, RealmConfig,
    RealmError, SharedRealm, SyncUser,
};
use tempfile::TempDir;

pub const SERVER_URL: &str = "http://127.0.0.1:9080";

/// Upper bound for waiting on callbacks.
pub const WAIT: Duration = Duration::from_secs(5);

/// How long to watch for a callback that must not arrive.
pub const QUIET: Duration = Duration::from_millis(300);

pub fn user(identity: &str) -> Arc<SyncUser> {
    Arc::new(SyncUser::new(identity, SERVER_URL, format!("{}-token", identity)))
}

/// Config maker producing in-memory realms.
pub fn in_memory_maker() -> ConfigMaker {
    Arc::new(|user: &Arc<SyncUser>, url: &str| {
        Ok(RealmConfig::in_memory().with_sync(Arc::clone(user), url))
    })
}

/// Config maker that always fails.
pub fn failing_maker() -> ConfigMaker {
    Arc::new(|_: &Arc<SyncUser>, url: &str| {
        Err(RealmError::Config(format!("no configuration for {}", url)))
    })
}

/// Common test fixture: a manager over local realms stored in a temporary
/// directory.
pub struct PermissionsFixture {
    pub permissions: Permissions,
    pub _temp_dir: TempDir,
}

impl PermissionsFixture {
    pub fn new() -> Self {
        Self::with_cache_capacity(PermissionsConfig::default().cache_capacity)
    }

    pub fn with_cache_capacity(cache_capacity: usize) -> Self {
        LoggingSystem::init_for_tests();
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let config = PermissionsConfig {
            storage_root: Some(temp_dir.path().to_path_buf()),
            open_timeout_ms: 5_000,
            cache_capacity,
            ..PermissionsConfig::default()
        };
        let permissions = Permissions::local(config, tokio::runtime::Handle::current());
        Self {
            permissions,
            _temp_dir: temp_dir,
        }
    }

    /// Config maker leaving the path to the local opener, so realms land in
    /// the fixture's storage root.
    pub fn on_disk_maker(&self) -> ConfigMaker {
        Arc::new(|user: &Arc<SyncUser>, url: &str| {
            Ok(RealmConfig::default().with_sync(Arc::clone(user), url))
        })
    }

    pub fn hidden_realm(&self, user: &SyncUser, kind: HiddenRealm) -> SharedRealm {
        self.permissions
            .cache()
            .get(user.identity(), kind)
            .expect("hidden realm is not open")
    }

    /// Writes a grant into `owner`'s permission realm, as the server would
    /// after processing a change.
    pub fn apply_grant(&self, owner: &SyncUser, permission: &Permission) {
        let realm = self.hidden_realm(owner, HiddenRealm::Permission);
        let record =
            PermissionRecord::from_permission(permission).expect("grants name a user");
        realm
            .write(|txn| txn.create("Permission", serde_json::to_value(&record)?))
            .expect("Failed to write grant");
    }

    /// Marks a change request as processed, as the server would.
    pub fn process_change(
        &self,
        owner: &SyncUser,
        ticket: &PermissionChangeTicket,
        status_code: i64,
        status_message: Option<&str>,
    ) {
        let realm = self.hidden_realm(owner, HiddenRealm::Management);
        let mut changes = Map::new();
        changes.insert("statusCode".to_string(), json!(status_code));
        changes.insert(
            "statusMessage".to_string(),
            status_message.map_or(Value::Null, |m| json!(m)),
        );
        realm
            .write(|txn| txn.update(PERMISSION_CHANGE_TABLE, &ticket.id, changes))
            .expect("Failed to update change record");
    }
}
