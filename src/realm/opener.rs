use async_trait::async_trait;
use std::path::PathBuf;

use super::config::RealmConfig;
use super::error::{RealmError, RealmResult};
use super::store::{Realm, SharedRealm};

/// Opens realms asynchronously.
///
/// Implementations backed by a sync client complete only once the realm has
/// reached a usable synchronized state (initial download finished). Failures
/// are reported once and never retried here.
#[async_trait]
pub trait RealmOpener: Send + Sync {
    async fn open(&self, config: RealmConfig) -> RealmResult<SharedRealm>;
}

/// Opens realms from local storage on a blocking task. There is no remote
/// side, so a realm is usable as soon as it is open.
#[derive(Debug, Clone, Default)]
pub struct LocalRealmOpener {
    storage_root: Option<PathBuf>,
}

impl LocalRealmOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Realms configured without a path are placed under `root`, in a
    /// directory named after the sync user and the last URL segment.
    pub fn with_storage_root(root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: Some(root.into()),
        }
    }

    fn resolve_path(&self, config: &mut RealmConfig) -> RealmResult<()> {
        if config.path.is_some() || config.in_memory {
            return Ok(());
        }
        let (Some(root), Some(sync)) = (&self.storage_root, &config.sync) else {
            return Err(RealmError::Config(format!(
                "no path configured for {}",
                config.describe()
            )));
        };
        let name = sync
            .realm_url
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or("default");
        config.path = Some(root.join(sanitize(sync.user.identity())).join(sanitize(name)));
        Ok(())
    }
}

fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

#[async_trait]
impl RealmOpener for LocalRealmOpener {
    async fn open(&self, mut config: RealmConfig) -> RealmResult<SharedRealm> {
        self.resolve_path(&mut config)?;
        log_realm_debug!("Opening {} on a blocking task", config.describe());
        tokio::task::spawn_blocking(move || Realm::open(config))
            .await
            .map_err(|e| RealmError::Io(format!("realm open task failed: {}", e)))?
    }
}
