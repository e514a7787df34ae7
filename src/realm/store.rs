//! Sled-backed local realm.
//!
//! Each object type is a sled tree of JSON-encoded records keyed by primary
//! key (or a generated id for types without one). Schemas are persisted in
//! the `__schema` tree and matched against the local schema on open.
//!
//! Writes run under the exclusive side of the storage lock and queries under
//! the shared side, so a query never observes half of a write transaction.
//! Closing takes the storage out from under the lock, which releases the
//! database file even while handles on the realm are still around.

use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use super::config::RealmConfig;
use super::error::{RealmError, RealmResult};
use super::notifier::Notifier;
use super::query::Query;
use super::results::Results;
use crate::schema::ObjectSchema;

const SCHEMA_TREE: &str = "__schema";
const TABLE_PREFIX: &str = "table:";

/// Shared handle on an open realm.
pub type SharedRealm = Arc<Realm>;

/// The open database and one tree per object type.
struct Storage {
    db: sled::Db,
    trees: HashMap<String, sled::Tree>,
}

impl Storage {
    fn tree(&self, name: &str) -> RealmResult<&sled::Tree> {
        self.trees
            .get(name)
            .ok_or_else(|| RealmError::UnknownTable(name.to_string()))
    }
}

/// Storage state shared between a realm and its notifier worker.
pub(crate) struct RealmCore {
    schemas: HashMap<String, ObjectSchema>,
    storage: RwLock<Option<Storage>>,
    version: AtomicU64,
    closed: AtomicBool,
}

impl RealmCore {
    fn schema(&self, name: &str) -> RealmResult<&ObjectSchema> {
        self.schemas
            .get(name)
            .ok_or_else(|| RealmError::UnknownTable(name.to_string()))
    }

    fn ensure_open(&self) -> RealmResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(RealmError::Closed)
        } else {
            Ok(())
        }
    }

    fn read_storage(&self) -> RwLockReadGuard<'_, Option<Storage>> {
        self.storage.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `query` over `table` against a consistent snapshot.
    pub(crate) fn evaluate(&self, table: &str, query: &Query) -> RealmResult<Vec<Value>> {
        self.ensure_open()?;
        let guard = self.read_storage();
        let tree = guard.as_ref().ok_or(RealmError::Closed)?.tree(table)?;
        let mut records = Vec::new();
        for entry in tree.iter() {
            let (_, bytes) = entry?;
            records.push(serde_json::from_slice::<Value>(&bytes)?);
        }
        Ok(query.apply(records))
    }

    /// Drops the database handles. Returns false if they were already gone.
    fn release(&self, name: &str) -> bool {
        let storage = self
            .storage
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match storage {
            Some(storage) => {
                if let Err(e) = storage.db.flush() {
                    log_realm_warn!("Flush on close of {} failed: {}", name, e);
                }
                true
            }
            None => false,
        }
    }
}

/// An open realm.
pub struct Realm {
    config: RealmConfig,
    core: Arc<RealmCore>,
    notifier: Notifier,
}

impl Realm {
    /// Opens (creating if needed) the realm described by `config`. Blocking;
    /// async callers go through a [`RealmOpener`](super::RealmOpener).
    pub fn open(config: RealmConfig) -> RealmResult<SharedRealm> {
        let db = match (&config.path, config.in_memory) {
            (_, true) => sled::Config::new().temporary(true).open()?,
            (Some(path), false) => sled::Config::new().path(path).open()?,
            (None, false) => {
                return Err(RealmError::Config(
                    "a realm needs a path unless it is in memory".to_string(),
                ))
            }
        };

        let schema_tree = db.open_tree(SCHEMA_TREE)?;
        let mut stored: HashMap<String, ObjectSchema> = HashMap::new();
        for entry in schema_tree.iter() {
            let (_, bytes) = entry?;
            let object_schema: ObjectSchema = serde_json::from_slice(&bytes)?;
            stored.insert(object_schema.name.clone(), object_schema);
        }

        let mut schemas = HashMap::new();
        let mut trees = HashMap::new();
        for local in &config.schema {
            local.validate()?;
            let mut object_schema = local.clone();
            match stored.remove(&local.name) {
                Some(existing) => {
                    let differences = object_schema.compare(&existing);
                    if !differences.is_empty() {
                        log_schema_warn!(
                            "Schema of '{}' does not match the stored one: {:?}",
                            local.name,
                            differences
                        );
                        return Err(crate::schema::SchemaError::Mismatch {
                            object_type: local.name.clone(),
                            differences,
                        }
                        .into());
                    }
                    object_schema.assign_columns(&existing);
                }
                None => {
                    schema_tree.insert(local.name.as_bytes(), serde_json::to_vec(local)?)?;
                    object_schema.assign_columns(local);
                    log_schema_debug!("Added object type '{}'", local.name);
                }
            }
            let tree = db.open_tree(format!("{}{}", TABLE_PREFIX, local.name))?;
            trees.insert(local.name.clone(), tree);
            schemas.insert(local.name.clone(), object_schema);
        }
        // object types known to the file but not to the caller
        for (name, mut existing) in stored {
            let columns = existing.clone();
            existing.assign_columns(&columns);
            let tree = db.open_tree(format!("{}{}", TABLE_PREFIX, name))?;
            trees.insert(name.clone(), tree);
            schemas.insert(name, existing);
        }
        db.flush()?;

        let notifier = Notifier::start(&config.describe())?;
        log_realm_info!(
            "Opened realm {} with {} object types",
            config.describe(),
            schemas.len()
        );
        Ok(Arc::new(Realm {
            config,
            core: Arc::new(RealmCore {
                schemas,
                storage: RwLock::new(Some(Storage { db, trees })),
                version: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
            notifier,
        }))
    }

    pub fn config(&self) -> &RealmConfig {
        &self.config
    }

    /// Number of committed write transactions since open.
    pub fn version(&self) -> u64 {
        self.core.version.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.core.closed.load(Ordering::SeqCst)
    }

    pub fn object_schema(&self, table: &str) -> Option<&ObjectSchema> {
        self.core.schemas.get(table)
    }

    pub fn object_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.core.schemas.keys().cloned().collect();
        names.sort();
        names
    }

    /// Live view of every object of `table`.
    pub fn objects(self: &Arc<Self>, table: &str) -> RealmResult<Results> {
        self.core.ensure_open()?;
        self.core.schema(table)?;
        Ok(Results::new(Arc::clone(self), table.to_string(), Query::new()))
    }

    /// Reads one object by key.
    pub fn find(&self, table: &str, key: &str) -> RealmResult<Option<Value>> {
        self.core.ensure_open()?;
        let guard = self.core.read_storage();
        let tree = guard.as_ref().ok_or(RealmError::Closed)?.tree(table)?;
        match tree.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Runs `body` as one write transaction. Changes become visible and are
    /// announced to live queries only if `body` succeeds.
    pub fn write<T>(
        &self,
        body: impl FnOnce(&mut WriteTransaction<'_>) -> RealmResult<T>,
    ) -> RealmResult<T> {
        self.core.ensure_open()?;
        let (version, value) = {
            let guard = self
                .core
                .storage
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let storage = guard.as_ref().ok_or(RealmError::Closed)?;
            let mut transaction = WriteTransaction {
                core: &self.core,
                storage,
                pending: Vec::new(),
            };
            let value = body(&mut transaction)?;
            if transaction.pending.is_empty() {
                return Ok(value);
            }
            let touched = transaction.apply()?;
            storage.db.flush()?;
            let version = self.core.version.fetch_add(1, Ordering::SeqCst) + 1;
            log_realm_debug!(
                "Committed version {} of {} touching {:?}",
                version,
                self.config.describe(),
                touched
            );
            (version, value)
        };
        self.notifier.commit(version);
        Ok(value)
    }

    /// Closes the realm and releases its database file. Live queries receive
    /// [`RealmError::Closed`] and further reads and writes fail.
    pub fn close(&self) {
        if self.core.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.notifier.shutdown();
        if self.core.release(&self.config.describe()) {
            log_realm_info!("Closed realm {}", self.config.describe());
        }
    }

    pub(crate) fn core(&self) -> &Arc<RealmCore> {
        &self.core
    }

    pub(crate) fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}

impl std::fmt::Debug for Realm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Realm")
            .field("realm", &self.config.describe())
            .field("version", &self.version())
            .field("closed", &self.is_closed())
            .finish()
    }
}

struct PendingWrite {
    table: String,
    key: String,
    record: Option<Value>,
}

/// Changes staged inside [`Realm::write`].
pub struct WriteTransaction<'a> {
    core: &'a RealmCore,
    storage: &'a Storage,
    pending: Vec<PendingWrite>,
}

impl WriteTransaction<'_> {
    /// Inserts `record`, replacing an existing object with the same primary
    /// key. Returns the object's key.
    pub fn create(&mut self, table: &str, record: Value) -> RealmResult<String> {
        let schema = self.core.schema(table)?;
        schema.validate_record(&record)?;
        let key = match schema.primary_key_of(&record)? {
            Some(key) => key,
            None => uuid::Uuid::new_v4().to_string(),
        };
        self.pending.push(PendingWrite {
            table: table.to_string(),
            key: key.clone(),
            record: Some(record),
        });
        Ok(key)
    }

    /// Merges `changes` into the object stored under `key`.
    pub fn update(
        &mut self,
        table: &str,
        key: &str,
        changes: serde_json::Map<String, Value>,
    ) -> RealmResult<()> {
        let mut record = self.current(table, key)?.ok_or_else(|| RealmError::ObjectNotFound {
            table: table.to_string(),
            key: key.to_string(),
        })?;
        if let Value::Object(fields) = &mut record {
            fields.extend(changes);
        }
        let schema = self.core.schema(table)?;
        schema.validate_record(&record)?;
        if schema.primary_key_of(&record)?.is_some_and(|new_key| new_key != key) {
            return Err(RealmError::Schema(crate::schema::SchemaError::InvalidData(format!(
                "the primary key of {}/{} cannot change",
                table, key
            ))));
        }
        self.pending.push(PendingWrite {
            table: table.to_string(),
            key: key.to_string(),
            record: Some(record),
        });
        Ok(())
    }

    /// Removes the object stored under `key`. Returns whether it existed.
    pub fn delete(&mut self, table: &str, key: &str) -> RealmResult<bool> {
        let existed = self.current(table, key)?.is_some();
        if existed {
            self.pending.push(PendingWrite {
                table: table.to_string(),
                key: key.to_string(),
                record: None,
            });
        }
        Ok(existed)
    }

    /// Reads an object as this transaction currently sees it.
    pub fn current(&self, table: &str, key: &str) -> RealmResult<Option<Value>> {
        if let Some(staged) = self
            .pending
            .iter()
            .rev()
            .find(|p| p.table == table && p.key == key)
        {
            return Ok(staged.record.clone());
        }
        match self.storage.tree(table)?.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn apply(self) -> RealmResult<BTreeSet<String>> {
        let mut batches: HashMap<&str, sled::Batch> = HashMap::new();
        for write in &self.pending {
            let batch = batches.entry(write.table.as_str()).or_default();
            match &write.record {
                Some(record) => batch.insert(write.key.as_bytes(), serde_json::to_vec(record)?),
                None => batch.remove(write.key.as_bytes()),
            }
        }
        let mut touched = BTreeSet::new();
        for (table, batch) in batches {
            self.storage.tree(table)?.apply_batch(batch)?;
            touched.insert(table.to_string());
        }
        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Property, PropertyKind};
    use serde_json::json;

    fn dog_schema() -> ObjectSchema {
        ObjectSchema::new(
            "Dog",
            vec![
                Property::new("name", PropertyKind::String).primary(),
                Property::new("age", PropertyKind::Int),
            ],
        )
    }

    #[test]
    fn test_write_and_query() {
        let realm = Realm::open(RealmConfig::in_memory().with_schema(vec![dog_schema()])).unwrap();
        realm
            .write(|txn| {
                txn.create("Dog", json!({ "name": "Rex", "age": 3 }))?;
                txn.create("Dog", json!({ "name": "Fido", "age": 5 }))?;
                Ok(())
            })
            .unwrap();
        assert_eq!(realm.version(), 1);

        let dogs = realm.objects("Dog").unwrap();
        assert_eq!(dogs.size().unwrap(), 2);
        assert_eq!(realm.find("Dog", "Rex").unwrap().unwrap()["age"], json!(3));
    }

    #[test]
    fn test_failed_transaction_is_discarded() {
        let realm = Realm::open(RealmConfig::in_memory().with_schema(vec![dog_schema()])).unwrap();
        let result = realm.write(|txn| {
            txn.create("Dog", json!({ "name": "Rex", "age": 3 }))?;
            txn.create("Dog", json!({ "name": "Fido", "age": "old" }))?;
            Ok(())
        });
        assert!(matches!(result, Err(RealmError::Schema(_))));
        assert_eq!(realm.version(), 0);
        assert!(realm.find("Dog", "Rex").unwrap().is_none());
    }

    #[test]
    fn test_update_and_delete() {
        let realm = Realm::open(RealmConfig::in_memory().with_schema(vec![dog_schema()])).unwrap();
        realm
            .write(|txn| txn.create("Dog", json!({ "name": "Rex", "age": 3 })))
            .unwrap();

        let mut changes = serde_json::Map::new();
        changes.insert("age".to_string(), json!(4));
        realm.write(|txn| txn.update("Dog", "Rex", changes)).unwrap();
        assert_eq!(realm.find("Dog", "Rex").unwrap().unwrap()["age"], json!(4));

        assert!(realm.write(|txn| txn.delete("Dog", "Rex")).unwrap());
        assert!(!realm.write(|txn| txn.delete("Dog", "Rex")).unwrap());
        assert_eq!(realm.version(), 3);
        assert!(matches!(
            realm.write(|txn| txn.update("Dog", "Rex", serde_json::Map::new())),
            Err(RealmError::ObjectNotFound { .. })
        ));
    }

    #[test]
    fn test_schema_mismatch_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dogs");
        {
            let realm =
                Realm::open(RealmConfig::at_path(&path).with_schema(vec![dog_schema()])).unwrap();
            realm.close();
        }

        let reopened = Realm::open(RealmConfig::at_path(&path)).unwrap();
        assert_eq!(reopened.object_types(), vec!["Dog".to_string()]);
        let columns: Vec<_> = reopened
            .object_schema("Dog")
            .unwrap()
            .properties
            .iter()
            .map(|p| p.table_column)
            .collect();
        assert_eq!(columns, vec![Some(0), Some(1)]);
        reopened.close();
        drop(reopened);

        let changed = ObjectSchema::new(
            "Dog",
            vec![
                Property::new("name", PropertyKind::String).primary(),
                Property::new("age", PropertyKind::Double),
            ],
        );
        let result = Realm::open(RealmConfig::at_path(&path).with_schema(vec![changed]));
        assert!(matches!(
            result,
            Err(RealmError::Schema(crate::schema::SchemaError::Mismatch { .. }))
        ));
    }

    #[test]
    fn test_closed_realm_rejects_access() {
        let realm = Realm::open(RealmConfig::in_memory().with_schema(vec![dog_schema()])).unwrap();
        realm.close();
        assert!(matches!(realm.objects("Dog"), Err(RealmError::Closed)));
        assert!(matches!(
            realm.write(|txn| txn.create("Dog", json!({ "name": "Rex", "age": 1 }))),
            Err(RealmError::Closed)
        ));
    }

    #[test]
    fn test_close_releases_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dogs");
        let realm =
            Realm::open(RealmConfig::at_path(&path).with_schema(vec![dog_schema()])).unwrap();
        realm
            .write(|txn| txn.create("Dog", json!({ "name": "Rex", "age": 3 })))
            .unwrap();
        let held = realm.objects("Dog").unwrap();
        realm.close();

        // the old handle and its results are still alive
        let reopened =
            Realm::open(RealmConfig::at_path(&path).with_schema(vec![dog_schema()])).unwrap();
        assert_eq!(reopened.find("Dog", "Rex").unwrap().unwrap()["age"], json!(3));
        assert!(matches!(held.size(), Err(RealmError::Closed)));
        assert!(matches!(realm.find("Dog", "Rex"), Err(RealmError::Closed)));
    }

    #[test]
    fn test_unknown_table() {
        let realm = Realm::open(RealmConfig::in_memory()).unwrap();
        assert!(matches!(
            realm.objects("Cat"),
            Err(RealmError::UnknownTable(_))
        ));
    }
}
