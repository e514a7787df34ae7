//! The permission manager.
//!
//! Permission changes are requests written into the user's management realm;
//! the server processes them and reports the outcome on the same record.
//! Effective grants are read from the user's permission realm. Both realms
//! are opened lazily through the caller's [`ConfigMaker`] and cached per user.
//!
//! Every operation follows
//! `Idle -> OpeningRealm -> (Failed | Ready) -> Submitting/Querying -> (Completed | Failed)`.
//! A failed open is reported once and not retried.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::error::PermissionChangeError;
use super::permission_results::PermissionResults;
use super::realm_cache::{HiddenRealm, RealmCache};
use super::types::{
    AccessLevel, ChangeStatus, Permission, PermissionChangeRecord, PermissionChangeTicket,
    PermissionRecord, PERMISSION_CHANGE_TABLE, PERMISSION_TABLE,
};
use crate::config::PermissionsConfig;
use crate::realm::{
    LocalRealmOpener, Predicate, Query, RealmConfig, RealmError, RealmOpener, RealmResult,
    SharedRealm, SyncUser,
};
use crate::schema::ObjectSchema;

/// Builds the configuration of a hidden realm from a user and the realm's URL.
pub type ConfigMaker =
    Arc<dyn Fn(&Arc<SyncUser>, &str) -> RealmResult<RealmConfig> + Send + Sync>;

pub type PermissionChangeResult<T> = Result<T, PermissionChangeError>;

/// Progress of one permission operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Idle,
    OpeningRealm,
    Ready,
    Submitting,
    Querying,
    Completed,
    Failed,
}

impl OperationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, OperationState::Completed | OperationState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    GetPermissions,
    SetPermission,
    DeletePermission,
    ChangeStatus,
    WatchChange,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::GetPermissions => "get_permissions",
            OperationKind::SetPermission => "set_permission",
            OperationKind::DeletePermission => "delete_permission",
            OperationKind::ChangeStatus => "change_status",
            OperationKind::WatchChange => "watch_change",
        };
        f.write_str(name)
    }
}

struct Operation {
    id: u64,
    kind: OperationKind,
    user: String,
    state: Arc<Mutex<OperationState>>,
}

impl Operation {
    fn advance(&self, next: OperationState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        log_permissions_debug!(
            "Operation {} ({} for '{}'): {:?} -> {:?}",
            self.id,
            self.kind,
            self.user,
            *state,
            next
        );
        *state = next;
    }

    fn fail(&self, error: PermissionChangeError) -> PermissionChangeError {
        log_permissions_warn!(
            "Operation {} ({} for '{}') failed: {}",
            self.id,
            self.kind,
            self.user,
            error
        );
        self.advance(OperationState::Failed);
        error
    }

    fn finish<T>(&self, result: PermissionChangeResult<T>) -> PermissionChangeResult<T> {
        match result {
            Ok(value) => {
                self.advance(OperationState::Completed);
                Ok(value)
            }
            Err(error) => Err(self.fail(error)),
        }
    }
}

/// Handle on an operation started by one of the callback entry points.
///
/// Aborting stops the operation at its next suspension point and the callback
/// is not invoked. A change request that was already committed stays
/// committed.
pub struct OperationHandle {
    id: u64,
    kind: OperationKind,
    state: Arc<Mutex<OperationState>>,
    task: JoinHandle<()>,
}

impl OperationHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn state(&self) -> OperationState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn abort(&self) {
        self.task.abort();
    }

    /// Waits until the callback has returned or the operation was aborted.
    /// A panicking callback is logged, not propagated.
    pub async fn finished(self) {
        if let Err(e) = self.task.await {
            if e.is_panic() {
                log_permissions_warn!(
                    "Operation {} ({}) panicked in its callback",
                    self.id,
                    self.kind
                );
            }
        }
    }
}

impl fmt::Debug for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .finish()
    }
}

struct Inner {
    opener: Arc<dyn RealmOpener>,
    cache: RealmCache,
    runtime: Handle,
    config: PermissionsConfig,
    next_operation: AtomicU64,
}

/// Reads and changes the permissions of sync users.
///
/// Cheap to clone; clones share the realm cache. Callback entry points run on
/// the runtime given at construction and return immediately.
#[derive(Clone)]
pub struct Permissions {
    inner: Arc<Inner>,
}

impl Permissions {
    pub fn new(opener: Arc<dyn RealmOpener>, config: PermissionsConfig, runtime: Handle) -> Self {
        let cache = RealmCache::new(config.cache_capacity);
        log_permissions_info!(
            "Permission manager ready (cache capacity {}, open timeout {} ms)",
            cache.capacity(),
            config.open_timeout_ms
        );
        Self {
            inner: Arc::new(Inner {
                opener,
                cache,
                runtime,
                config,
                next_operation: AtomicU64::new(1),
            }),
        }
    }

    /// A manager over local realms stored under `config.storage_root`.
    pub fn local(config: PermissionsConfig, runtime: Handle) -> Self {
        let opener = match &config.storage_root {
            Some(root) => LocalRealmOpener::with_storage_root(root),
            None => LocalRealmOpener::new(),
        };
        Self::new(Arc::new(opener), config, runtime)
    }

    pub fn config(&self) -> &PermissionsConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &RealmCache {
        &self.inner.cache
    }

    /// Starts reading the permissions visible to `user`. `callback` receives
    /// a live [`PermissionResults`] or the error that stopped the read.
    pub fn get_permissions<F>(
        &self,
        user: Arc<SyncUser>,
        callback: F,
        config_maker: ConfigMaker,
    ) -> OperationHandle
    where
        F: FnOnce(PermissionChangeResult<PermissionResults>) + Send + 'static,
    {
        let operation = self.operation(OperationKind::GetPermissions, &user);
        let this = self.clone();
        self.spawn(operation, move |operation| async move {
            let result = this.run_get(&operation, &user, &config_maker).await;
            callback(result);
        })
    }

    /// Starts submitting a request to grant `permission`. `callback` fires
    /// once the request is committed locally, before the server has seen it.
    pub fn set_permission<F>(
        &self,
        user: Arc<SyncUser>,
        permission: Permission,
        callback: F,
        config_maker: ConfigMaker,
    ) -> OperationHandle
    where
        F: FnOnce(PermissionChangeResult<PermissionChangeTicket>) + Send + 'static,
    {
        let operation = self.operation(OperationKind::SetPermission, &user);
        let this = self.clone();
        self.spawn(operation, move |operation| async move {
            let access = permission.access;
            let result = this
                .run_change(&operation, &user, &permission, access, &config_maker)
                .await;
            callback(result);
        })
    }

    /// Starts submitting a request to revoke `permission`.
    pub fn delete_permission<F>(
        &self,
        user: Arc<SyncUser>,
        permission: Permission,
        callback: F,
        config_maker: ConfigMaker,
    ) -> OperationHandle
    where
        F: FnOnce(PermissionChangeResult<PermissionChangeTicket>) + Send + 'static,
    {
        let operation = self.operation(OperationKind::DeletePermission, &user);
        let this = self.clone();
        self.spawn(operation, move |operation| async move {
            let result = this
                .run_change(&operation, &user, &permission, AccessLevel::None, &config_maker)
                .await;
            callback(result);
        })
    }

    /// Waits for the server to process the change behind `ticket`. `callback`
    /// fires exactly once: `Ok(())` when the change was accepted, a
    /// [`ChangeStage::RemoteRejection`](super::ChangeStage::RemoteRejection)
    /// error when it was refused, or the error that stopped the wait.
    pub fn watch_change<F>(
        &self,
        user: Arc<SyncUser>,
        ticket: PermissionChangeTicket,
        callback: F,
        config_maker: ConfigMaker,
    ) -> OperationHandle
    where
        F: FnOnce(PermissionChangeResult<()>) + Send + 'static,
    {
        let operation = self.operation(OperationKind::WatchChange, &user);
        let this = self.clone();
        self.spawn(operation, move |operation| async move {
            let result = this.run_watch(&operation, &user, &ticket, &config_maker).await;
            callback(result);
        })
    }

    /// Reads the permissions visible to `user`.
    pub async fn fetch_permissions(
        &self,
        user: &Arc<SyncUser>,
        config_maker: &ConfigMaker,
    ) -> PermissionChangeResult<PermissionResults> {
        let operation = self.operation(OperationKind::GetPermissions, user);
        self.run_get(&operation, user, config_maker).await
    }

    /// Submits a request to grant `permission`.
    pub async fn submit_permission(
        &self,
        user: &Arc<SyncUser>,
        permission: &Permission,
        config_maker: &ConfigMaker,
    ) -> PermissionChangeResult<PermissionChangeTicket> {
        let operation = self.operation(OperationKind::SetPermission, user);
        self.run_change(&operation, user, permission, permission.access, config_maker)
            .await
    }

    /// Submits a request to revoke `permission`.
    pub async fn revoke_permission(
        &self,
        user: &Arc<SyncUser>,
        permission: &Permission,
        config_maker: &ConfigMaker,
    ) -> PermissionChangeResult<PermissionChangeTicket> {
        let operation = self.operation(OperationKind::DeletePermission, user);
        self.run_change(&operation, user, permission, AccessLevel::None, config_maker)
            .await
    }

    /// Current processing state of the change behind `ticket`.
    pub async fn change_status(
        &self,
        user: &Arc<SyncUser>,
        ticket: &PermissionChangeTicket,
        config_maker: &ConfigMaker,
    ) -> PermissionChangeResult<ChangeStatus> {
        let operation = self.operation(OperationKind::ChangeStatus, user);
        let result = async {
            let realm = self
                .open_hidden(&operation, user, HiddenRealm::Management, config_maker)
                .await?;
            operation.advance(OperationState::Querying);
            read_status(&realm, ticket)
        }
        .await;
        operation.finish(result)
    }

    /// Drops and closes the cached realms of `identity`.
    pub fn close_user(&self, identity: &str) {
        log_permissions_info!("Closing hidden realms of '{}'", identity);
        self.inner.cache.close_user(identity);
    }

    /// Closes every cached realm.
    pub fn shutdown(&self) {
        log_permissions_info!("Shutting down permission manager");
        self.inner.cache.clear();
    }

    fn operation(&self, kind: OperationKind, user: &SyncUser) -> Operation {
        Operation {
            id: self.inner.next_operation.fetch_add(1, Ordering::SeqCst),
            kind,
            user: user.identity().to_string(),
            state: Arc::new(Mutex::new(OperationState::Idle)),
        }
    }

    fn spawn<B, Fut>(&self, operation: Operation, body: B) -> OperationHandle
    where
        B: FnOnce(Operation) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let id = operation.id;
        let kind = operation.kind;
        let state = Arc::clone(&operation.state);
        let task = self.inner.runtime.spawn(body(operation));
        OperationHandle {
            id,
            kind,
            state,
            task,
        }
    }

    async fn run_get(
        &self,
        operation: &Operation,
        user: &Arc<SyncUser>,
        config_maker: &ConfigMaker,
    ) -> PermissionChangeResult<PermissionResults> {
        let result = async {
            let realm = self
                .open_hidden(operation, user, HiddenRealm::Permission, config_maker)
                .await?;
            operation.advance(OperationState::Querying);
            let results = realm
                .objects(PERMISSION_TABLE)
                .map_err(|e| PermissionChangeError::query(&e))?
                .filter(visible_permissions());
            Ok::<_, PermissionChangeError>(PermissionResults::new(results))
        }
        .await;
        operation.finish(result)
    }

    async fn run_change(
        &self,
        operation: &Operation,
        user: &Arc<SyncUser>,
        permission: &Permission,
        access: AccessLevel,
        config_maker: &ConfigMaker,
    ) -> PermissionChangeResult<PermissionChangeTicket> {
        let result = async {
            let realm_url = target_realm_url(user.server_url(), &permission.path)
                .map_err(|e| PermissionChangeError::configuration(&e))?;
            let realm = self
                .open_hidden(operation, user, HiddenRealm::Management, config_maker)
                .await?;

            operation.advance(OperationState::Submitting);
            let record = PermissionChangeRecord::request(permission, access, realm_url);
            let ticket = PermissionChangeTicket {
                id: record.id.clone(),
                user: user.identity().to_string(),
            };
            let value = record
                .to_value()
                .map_err(|e| PermissionChangeError::submit(&RealmError::from(e)))?;
            tokio::task::spawn_blocking(move || {
                realm.write(|txn| txn.create(PERMISSION_CHANGE_TABLE, value))
            })
            .await
            .map_err(|e| {
                PermissionChangeError::submit(&RealmError::Io(format!("write task failed: {}", e)))
            })?
            .map_err(|e| PermissionChangeError::submit(&e))?;

            log_permissions_info!("Submitted {}: {} (requested {})", ticket, permission, access);
            Ok::<_, PermissionChangeError>(ticket)
        }
        .await;
        operation.finish(result)
    }

    async fn run_watch(
        &self,
        operation: &Operation,
        user: &Arc<SyncUser>,
        ticket: &PermissionChangeTicket,
        config_maker: &ConfigMaker,
    ) -> PermissionChangeResult<()> {
        let result = async {
            let realm = self
                .open_hidden(operation, user, HiddenRealm::Management, config_maker)
                .await?;
            operation.advance(OperationState::Querying);

            let change = realm
                .objects(PERMISSION_CHANGE_TABLE)
                .map_err(|e| PermissionChangeError::query(&e))?
                .filter(Query::new().equal("id", ticket.id.as_str()));
            let (sender, mut receiver) = mpsc::unbounded_channel();
            let _token = change
                .add_notification_callback(move |outcome| {
                    let _ = sender.send(outcome);
                })
                .map_err(|e| PermissionChangeError::query(&e))?;

            while let Some(outcome) = receiver.recv().await {
                outcome.map_err(|e| PermissionChangeError::query(&e))?;
                match read_status(&realm, ticket)? {
                    ChangeStatus::Pending => continue,
                    ChangeStatus::Accepted => return Ok(()),
                    ChangeStatus::Rejected { code, message } => {
                        return Err(PermissionChangeError::rejected(code, message))
                    }
                }
            }
            Err(PermissionChangeError::query(&RealmError::Closed))
        }
        .await;
        operation.finish(result)
    }

    /// Opens (or reuses) one of the user's hidden realms.
    async fn open_hidden(
        &self,
        operation: &Operation,
        user: &Arc<SyncUser>,
        kind: HiddenRealm,
        config_maker: &ConfigMaker,
    ) -> PermissionChangeResult<SharedRealm> {
        operation.advance(OperationState::OpeningRealm);
        let identity = user.identity();
        if let Some(realm) = self.inner.cache.get(identity, kind) {
            operation.advance(OperationState::Ready);
            return Ok(realm);
        }

        let url = hidden_realm_url(user.server_url(), kind)
            .map_err(|e| PermissionChangeError::configuration(&e))?;
        let config = (config_maker)(user, &url)
            .map(|config| prepare_config(config, user, &url, kind))
            .map_err(|e| PermissionChangeError::configuration(&e))?;

        let timeout = self.inner.config.open_timeout();
        let timeout_ms = self.inner.config.open_timeout_ms;
        let opener = Arc::clone(&self.inner.opener);
        let realm = self
            .inner
            .cache
            .get_or_open(identity, kind, || async move {
                log_permissions_debug!("Opening {} of '{}' at {}", kind, user.identity(), url);
                match tokio::time::timeout(timeout, opener.open(config)).await {
                    Ok(result) => result,
                    Err(_) => Err(RealmError::Timeout(timeout_ms)),
                }
            })
            .await
            .map_err(|e| PermissionChangeError::open(&e))?;
        operation.advance(OperationState::Ready);
        Ok(realm)
    }
}

impl fmt::Debug for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permissions")
            .field("config", &self.inner.config)
            .field("cache", &self.inner.cache)
            .finish()
    }
}

/// URL of the user's management realm on `server_url`.
pub fn management_realm_url(server_url: &str) -> RealmResult<String> {
    hidden_realm_url(server_url, HiddenRealm::Management)
}

/// URL of the user's permission realm on `server_url`.
pub fn permission_realm_url(server_url: &str) -> RealmResult<String> {
    hidden_realm_url(server_url, HiddenRealm::Permission)
}

fn hidden_realm_url(server_url: &str, kind: HiddenRealm) -> RealmResult<String> {
    Ok(format!("{}/~/{}", realm_base_url(server_url)?, kind.path_segment()))
}

/// `server_url` with its http(s) scheme replaced by realm(s), without a
/// trailing slash.
fn realm_base_url(server_url: &str) -> RealmResult<String> {
    let (scheme, rest) = server_url.split_once("://").ok_or_else(|| {
        RealmError::Config(format!("server URL '{}' has no scheme", server_url))
    })?;
    let scheme = match scheme {
        "http" | "realm" => "realm",
        "https" | "realms" => "realms",
        other => {
            return Err(RealmError::Config(format!(
                "unsupported server URL scheme '{}'",
                other
            )))
        }
    };
    let host = rest.trim_end_matches('/');
    if host.is_empty() {
        return Err(RealmError::Config(format!(
            "server URL '{}' has no host",
            server_url
        )));
    }
    Ok(format!("{}://{}", scheme, host))
}

/// The realm URL a permission path refers to. Absolute paths are resolved
/// against the user's server; full URLs are kept.
fn target_realm_url(server_url: &str, path: &str) -> RealmResult<String> {
    if path.contains("://") {
        return Ok(path.to_string());
    }
    if path.is_empty() {
        return Err(RealmError::Config("permission path is empty".to_string()));
    }
    let base = realm_base_url(server_url)?;
    if path.starts_with('/') {
        Ok(format!("{}{}", base, path))
    } else {
        Ok(format!("{}/{}", base, path))
    }
}

/// Makes sure the configuration describes the hidden realm: its record type
/// is part of the schema and sync points at `url`.
fn prepare_config(
    mut config: RealmConfig,
    user: &Arc<SyncUser>,
    url: &str,
    kind: HiddenRealm,
) -> RealmConfig {
    let schema: ObjectSchema = match kind {
        HiddenRealm::Management => PermissionChangeRecord::object_schema(),
        HiddenRealm::Permission => PermissionRecord::object_schema(),
    };
    if !config.schema.iter().any(|s| s.name == schema.name) {
        config.schema.push(schema);
    }
    if config.sync.is_none() {
        config = config.with_sync(Arc::clone(user), url);
    }
    config
}

/// Grants on the user's own hidden realms are not reported.
fn visible_permissions() -> Query {
    Query::new()
        .with(Predicate::Not(Box::new(Predicate::EndsWith(
            "path".to_string(),
            format!("/{}", HiddenRealm::Management.path_segment()),
        ))))
        .with(Predicate::Not(Box::new(Predicate::EndsWith(
            "path".to_string(),
            format!("/{}", HiddenRealm::Permission.path_segment()),
        ))))
        .sorted_by("path", true)
}

fn read_status(
    realm: &SharedRealm,
    ticket: &PermissionChangeTicket,
) -> PermissionChangeResult<ChangeStatus> {
    let value = realm
        .find(PERMISSION_CHANGE_TABLE, &ticket.id)
        .map_err(|e| PermissionChangeError::query(&e))?
        .ok_or_else(|| {
            PermissionChangeError::query(&RealmError::ObjectNotFound {
                table: PERMISSION_CHANGE_TABLE.to_string(),
                key: ticket.id.clone(),
            })
        })?;
    let record: PermissionChangeRecord = serde_json::from_value(value)
        .map_err(|e| PermissionChangeError::query(&RealmError::from(e)))?;
    Ok(ChangeStatus::from(&record))
}
