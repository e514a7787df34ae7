use serde_json::Value;
use std::sync::Arc;

use super::error::{RealmError, RealmResult};
use super::notifier::{NotificationCallback, NotificationToken, QuerySource};
use super::query::Query;
use super::store::Realm;

/// Live view over the objects of one table matching a query.
///
/// Accessors evaluate against the latest committed state; values they return
/// are snapshots. Clones share their notification lifetime, while
/// [`Results::filter`] produces an independent view.
#[derive(Clone)]
pub struct Results {
    realm: Arc<Realm>,
    table: String,
    query: Query,
    anchor: Arc<()>,
}

impl Results {
    pub(crate) fn new(realm: Arc<Realm>, table: String, query: Query) -> Self {
        Self {
            realm,
            table,
            query,
            anchor: Arc::new(()),
        }
    }

    pub fn realm(&self) -> &Arc<Realm> {
        &self.realm
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn snapshot(&self) -> RealmResult<Vec<Value>> {
        self.realm.core().evaluate(&self.table, &self.query)
    }

    pub fn size(&self) -> RealmResult<usize> {
        Ok(self.snapshot()?.len())
    }

    /// The object at `index`, or [`RealmError::IndexOutOfBounds`].
    pub fn get(&self, index: usize) -> RealmResult<Value> {
        let mut snapshot = self.snapshot()?;
        let size = snapshot.len();
        if index >= size {
            return Err(RealmError::IndexOutOfBounds { index, size });
        }
        Ok(snapshot.swap_remove(index))
    }

    /// A new view narrowed by `query`; `self` is unchanged.
    pub fn filter(&self, query: Query) -> Results {
        Results::new(
            Arc::clone(&self.realm),
            self.table.clone(),
            self.query.clone().and(query),
        )
    }

    /// Subscribes to changes of this view. The callback runs on the realm's
    /// notifier thread: once right away, then after every commit that changes
    /// the view. Keep the token alive for as long as notifications are wanted.
    pub fn add_notification_callback<F>(&self, callback: F) -> RealmResult<NotificationToken>
    where
        F: FnMut(RealmResult<()>) + Send + 'static,
    {
        if self.realm.is_closed() {
            return Err(RealmError::Closed);
        }
        let source = QuerySource {
            core: Arc::downgrade(self.realm.core()),
            table: self.table.clone(),
            query: self.query.clone(),
        };
        let callback: NotificationCallback = Box::new(callback);
        self.realm
            .notifier()
            .subscribe(source, Arc::downgrade(&self.anchor), callback)
    }
}

impl std::fmt::Debug for Results {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Results")
            .field("table", &self.table)
            .field("query", &self.query)
            .finish()
    }
}
