//! # Local realm engine
//!
//! A small object store with the contracts the permission layer relies on:
//! schema-checked tables, atomic write transactions, filtered and sorted live
//! result sets, and change notifications delivered from a background thread
//! in commit order.
//!
//! ```rust
//! use sync_permissions::realm::{Realm, RealmConfig, Query};
//! use sync_permissions::schema::{ObjectSchema, Property, PropertyKind};
//! use serde_json::json;
//!
//! let schema = ObjectSchema::new("Dog", vec![
//!     Property::new("name", PropertyKind::String).primary(),
//! ]);
//! let realm = Realm::open(RealmConfig::in_memory().with_schema(vec![schema])).unwrap();
//! realm.write(|txn| txn.create("Dog", json!({ "name": "Rex" }))).unwrap();
//!
//! let rex = realm.objects("Dog").unwrap().filter(Query::new().equal("name", "Rex"));
//! assert_eq!(rex.size().unwrap(), 1);
//! ```

pub mod config;
pub mod error;
pub mod notifier;
pub mod opener;
pub mod query;
pub mod results;
pub mod store;
pub mod user;

pub use config::{RealmConfig, SyncConfig};
pub use error::{RealmError, RealmResult};
pub use notifier::{NotificationCallback, NotificationToken};
pub use opener::{LocalRealmOpener, RealmOpener};
pub use query::{Predicate, Query, SortDescriptor};
pub use results::Results;
pub use store::{Realm, SharedRealm, WriteTransaction};
pub use user::SyncUser;
