//! Per-user cache of open hidden realms.
//!
//! Entries are keyed by user identity and realm kind, so a handle opened for
//! one user is never returned for another. Concurrent first opens of the same
//! key share one open; a failed open leaves the entry empty for the next
//! caller. When the cache is full the least recently used entry is dropped.
//! A dropped realm that is still held elsewhere is remembered weakly and
//! handed out again instead of being opened a second time.

use lru::LruCache;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::OnceCell;

use crate::realm::{Realm, RealmResult, SharedRealm};

/// The two per-user realms used by the permission protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HiddenRealm {
    /// Where change requests are written.
    Management,
    /// Where effective grants are read.
    Permission,
}

impl HiddenRealm {
    /// Last path segment of the realm's URL.
    pub fn path_segment(self) -> &'static str {
        match self {
            HiddenRealm::Management => "__management",
            HiddenRealm::Permission => "__permission",
        }
    }
}

impl fmt::Display for HiddenRealm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HiddenRealm::Management => f.write_str("management realm"),
            HiddenRealm::Permission => f.write_str("permission realm"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    identity: String,
    kind: HiddenRealm,
}

impl CacheKey {
    fn new(identity: &str, kind: HiddenRealm) -> Self {
        Self {
            identity: identity.to_string(),
            kind,
        }
    }
}

type Slot = Arc<OnceCell<SharedRealm>>;

struct Slots {
    entries: LruCache<CacheKey, Slot>,
    /// Realms evicted while someone else still held them.
    retired: HashMap<CacheKey, Weak<Realm>>,
}

impl Slots {
    fn take_retired(&mut self, key: &CacheKey) -> Option<SharedRealm> {
        self.retired.retain(|_, realm| realm.strong_count() > 0);
        self.retired
            .remove(key)
            .and_then(|realm| realm.upgrade())
            .filter(|realm| !realm.is_closed())
    }

    /// Removes every entry matching `select`, cached or retired, and returns
    /// the realms among them that are still open.
    fn drain_where(&mut self, select: impl Fn(&CacheKey) -> bool) -> Vec<SharedRealm> {
        let keys: Vec<CacheKey> = self
            .entries
            .iter()
            .map(|(key, _)| key)
            .filter(|key| select(*key))
            .cloned()
            .collect();
        let mut drained = Vec::new();
        for key in keys {
            if let Some(slot) = self.entries.pop(&key) {
                drained.extend(slot.get().map(Arc::clone));
            }
        }
        let retired: Vec<CacheKey> = self
            .retired
            .keys()
            .filter(|key| select(*key))
            .cloned()
            .collect();
        for key in retired {
            if let Some(realm) = self.retired.remove(&key).and_then(|realm| realm.upgrade()) {
                drained.push(realm);
            }
        }
        drained.retain(|realm| !realm.is_closed());
        drained
    }
}

pub struct RealmCache {
    capacity: NonZeroUsize,
    slots: Mutex<Slots>,
}

impl RealmCache {
    /// A cache holding at most `capacity` realms (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            capacity,
            slots: Mutex::new(Slots {
                entries: LruCache::new(capacity),
                retired: HashMap::new(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Returns the cached realm for `(identity, kind)`, running `open` when
    /// there is none. Callers racing on the same key wait for one open.
    pub async fn get_or_open<F, Fut>(
        &self,
        identity: &str,
        kind: HiddenRealm,
        open: F,
    ) -> RealmResult<SharedRealm>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RealmResult<SharedRealm>>,
    {
        let slot = self.slot(identity, kind);
        let realm = slot.get_or_try_init(open).await?;
        Ok(Arc::clone(realm))
    }

    /// The cached realm for `(identity, kind)` if one is open. Counts as a use.
    pub fn get(&self, identity: &str, kind: HiddenRealm) -> Option<SharedRealm> {
        let mut slots = self.lock();
        slots
            .entries
            .get(&CacheKey::new(identity, kind))
            .and_then(|slot| slot.get())
            .filter(|realm| !realm.is_closed())
            .map(Arc::clone)
    }

    fn slot(&self, identity: &str, kind: HiddenRealm) -> Slot {
        let key = CacheKey::new(identity, kind);
        let mut slots = self.lock();

        let stale = slots
            .entries
            .peek(&key)
            .and_then(|slot| slot.get())
            .is_some_and(|realm| realm.is_closed());
        if stale {
            log_permissions_debug!("Dropping closed {} of '{}' from cache", kind, identity);
            slots.entries.pop(&key);
        }

        if let Some(slot) = slots.entries.get(&key) {
            return Arc::clone(slot);
        }

        let held = slots.take_retired(&key);
        if held.is_some() {
            log_permissions_debug!("Reusing {} of '{}' still held elsewhere", kind, identity);
        }
        let slot: Slot = Arc::new(OnceCell::new_with(held));
        if let Some((evicted, old)) = slots.entries.push(key, Arc::clone(&slot)) {
            if let Some(realm) = old.get() {
                slots.retired.insert(evicted.clone(), Arc::downgrade(realm));
            }
            log_permissions_debug!(
                "Evicted {} of '{}' from realm cache",
                evicted.kind,
                evicted.identity
            );
        }
        slot
    }

    /// Removes both realms of `identity` from the cache and returns the ones
    /// that are still open, including evicted ones held elsewhere.
    pub fn evict_user(&self, identity: &str) -> Vec<SharedRealm> {
        self.lock().drain_where(|key| key.identity == identity)
    }

    /// Evicts and closes both realms of `identity`.
    pub fn close_user(&self, identity: &str) {
        for realm in self.evict_user(identity) {
            realm.close();
        }
    }

    /// Closes every realm the cache knows of and empties it.
    pub fn clear(&self) {
        let drained = self.lock().drain_where(|_| true);
        for realm in drained {
            realm.close();
        }
    }

    /// Number of keys currently held, including opens still in flight.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for RealmCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealmCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}
