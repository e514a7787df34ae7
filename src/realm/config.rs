use std::path::PathBuf;
use std::sync::Arc;

use super::user::SyncUser;
use crate::schema::ObjectSchema;

/// Sync settings of a realm: who syncs it and where it lives on the server.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub user: Arc<SyncUser>,
    pub realm_url: String,
}

/// Everything needed to open a realm.
#[derive(Debug, Clone, Default)]
pub struct RealmConfig {
    /// On-disk location. Openers may derive one when unset.
    pub path: Option<PathBuf>,
    /// Keep the realm in a temporary store removed on close.
    pub in_memory: bool,
    /// Local schema. Object types already stored in the realm but missing
    /// here are loaded from the stored schema.
    pub schema: Vec<ObjectSchema>,
    pub sync: Option<SyncConfig>,
}

impl RealmConfig {
    pub fn in_memory() -> Self {
        Self {
            in_memory: true,
            ..Self::default()
        }
    }

    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn with_schema(mut self, schema: Vec<ObjectSchema>) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_sync(mut self, user: Arc<SyncUser>, realm_url: impl Into<String>) -> Self {
        self.sync = Some(SyncConfig {
            user,
            realm_url: realm_url.into(),
        });
        self
    }

    /// Human-readable name for logs.
    pub fn describe(&self) -> String {
        match (&self.sync, &self.path) {
            (Some(sync), _) => sync.realm_url.clone(),
            (None, Some(path)) => path.display().to_string(),
            (None, None) => "<in-memory>".to_string(),
        }
    }
}
