use serde_json::Value;

use super::error::PermissionResultsError;
use super::types::{AccessLevel, Permission, PermissionRecord};
use crate::realm::{NotificationToken, Query, RealmResult, Results};

pub type PermissionResultsResult<T> = Result<T, PermissionResultsError>;

/// Live, filterable view over the `Permission` records of a permission realm.
///
/// Obtained from [`Permissions::get_permissions`](super::Permissions::get_permissions)
/// or by filtering another instance. Values returned by [`get`](Self::get) and
/// [`snapshot`](Self::snapshot) are copies; the view itself tracks the realm.
#[derive(Clone, Debug)]
pub struct PermissionResults {
    results: Results,
}

impl PermissionResults {
    pub(crate) fn new(results: Results) -> Self {
        Self { results }
    }

    pub fn size(&self) -> PermissionResultsResult<usize> {
        Ok(self.results.size()?)
    }

    pub fn is_empty(&self) -> PermissionResultsResult<bool> {
        Ok(self.size()? == 0)
    }

    /// The permission at `index`, or [`PermissionResultsError::OutOfBounds`]
    /// when `index >= size()`.
    pub fn get(&self, index: usize) -> PermissionResultsResult<Permission> {
        to_permission(self.results.get(index)?)
    }

    pub fn snapshot(&self) -> PermissionResultsResult<Vec<Permission>> {
        self.results
            .snapshot()?
            .into_iter()
            .map(to_permission)
            .collect()
    }

    /// Subscribes to changes of this view; see
    /// [`Results::add_notification_callback`].
    pub fn add_notification_callback<F>(&self, callback: F) -> RealmResult<NotificationToken>
    where
        F: FnMut(RealmResult<()>) + Send + 'static,
    {
        self.results.add_notification_callback(callback)
    }

    /// A new view narrowed by `query`. The new view has its own notification
    /// lifecycle and `self` is unchanged.
    pub fn filter(&self, query: Query) -> PermissionResults {
        PermissionResults::new(self.results.filter(query))
    }

    /// Grants of at least `level`.
    pub fn with_access(&self, level: AccessLevel) -> PermissionResults {
        let query = match level {
            AccessLevel::None => Query::new(),
            AccessLevel::Read => Query::new().equal("mayRead", true),
            AccessLevel::Write => Query::new().equal("mayWrite", true),
            AccessLevel::Admin => Query::new().equal("mayManage", true),
        };
        self.filter(query)
    }

    pub fn for_path(&self, path: &str) -> PermissionResults {
        self.filter(Query::new().equal("path", path))
    }

    pub fn for_user(&self, user_id: &str) -> PermissionResults {
        self.filter(Query::new().equal("userId", user_id))
    }

    pub fn query(&self) -> &Query {
        self.results.query()
    }
}

fn to_permission(value: Value) -> PermissionResultsResult<Permission> {
    let record: PermissionRecord = serde_json::from_value(value)?;
    Ok(record.to_permission())
}
