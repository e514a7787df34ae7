//! Background re-evaluation of live queries.
//!
//! Every open realm owns one notifier worker thread. Commits and new
//! subscriptions reach it over a channel, so each subscription observes
//! commits in commit order. For each commit the worker re-runs every live
//! query against a consistent snapshot and calls back only when the result
//! changed.
//!
//! Delivery and token destruction are serialized through the subscription's
//! callback lock: once [`NotificationToken`] has been dropped, its callback is
//! never invoked again.

use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::{self, JoinHandle, ThreadId};

use super::error::{RealmError, RealmResult};
use super::query::Query;
use super::store::RealmCore;

/// Callback invoked on the notifier thread. `Ok(())` means the view may have
/// a new state; an error is delivered once and ends the subscription.
pub type NotificationCallback = Box<dyn FnMut(RealmResult<()>) + Send>;

/// What a subscription evaluates. Holds the storage weakly so an outstanding
/// token does not keep a released realm open.
#[derive(Clone)]
pub(crate) struct QuerySource {
    pub(crate) core: Weak<RealmCore>,
    pub(crate) table: String,
    pub(crate) query: Query,
}

impl QuerySource {
    pub(crate) fn evaluate(&self) -> RealmResult<Vec<Value>> {
        let core = self.core.upgrade().ok_or(RealmError::Closed)?;
        core.evaluate(&self.table, &self.query)
    }
}

pub(crate) struct Subscription {
    id: u64,
    source: QuerySource,
    /// Liveness of the results the subscription was created from.
    anchor: Weak<()>,
    active: AtomicBool,
    callback: Mutex<Option<NotificationCallback>>,
    worker: ThreadId,
}

impl Subscription {
    fn is_live(&self) -> bool {
        self.active.load(Ordering::SeqCst) && self.anchor.strong_count() > 0
    }

    /// Returns false once the subscription is finished.
    fn deliver(&self, outcome: RealmResult<()>) -> bool {
        let mut guard = self.callback.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.is_live() {
            *guard = None;
            return false;
        }
        let terminal = outcome.is_err();
        if let Some(callback) = guard.as_mut() {
            callback(outcome);
        }
        if terminal {
            self.active.store(false, Ordering::SeqCst);
        }
        // the callback may have dropped its own token
        if !self.active.load(Ordering::SeqCst) {
            *guard = None;
            return false;
        }
        true
    }

    fn cancel(&self) {
        self.active.store(false, Ordering::SeqCst);
        // Dropping from inside a callback: the worker holds the lock and
        // clears the callback after it returns.
        if thread::current().id() != self.worker {
            let mut guard = self.callback.lock().unwrap_or_else(PoisonError::into_inner);
            *guard = None;
        }
    }
}

/// Handle on one live subscription. Dropping it unsubscribes.
#[must_use = "notifications stop when the token is dropped"]
pub struct NotificationToken {
    subscription: Arc<Subscription>,
}

impl NotificationToken {
    pub fn id(&self) -> u64 {
        self.subscription.id
    }

    /// False after an error was delivered, after the results were dropped or
    /// after the realm was closed.
    pub fn is_active(&self) -> bool {
        self.subscription.is_live()
    }
}

impl Drop for NotificationToken {
    fn drop(&mut self) {
        self.subscription.cancel();
        log_notifications_trace!("Notification token {} released", self.subscription.id);
    }
}

impl std::fmt::Debug for NotificationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationToken")
            .field("id", &self.subscription.id)
            .field("active", &self.is_active())
            .finish()
    }
}

enum NotifierMessage {
    Subscribe(Arc<Subscription>),
    Commit(u64),
    Shutdown,
}

struct Registered {
    subscription: Arc<Subscription>,
    last: Vec<Value>,
}

/// Owner of the worker thread of one realm.
pub(crate) struct Notifier {
    sender: Sender<NotifierMessage>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
    next_id: AtomicU64,
}

impl Notifier {
    pub(crate) fn start(name: &str) -> RealmResult<Self> {
        let (sender, receiver) = mpsc::channel();
        let worker = thread::Builder::new()
            .name(format!("realm-notifier:{}", name))
            .spawn(move || run_worker(receiver))
            .map_err(|e| RealmError::Io(format!("failed to start notifier: {}", e)))?;
        let worker_id = worker.thread().id();
        Ok(Self {
            sender,
            worker: Mutex::new(Some(worker)),
            worker_id,
            next_id: AtomicU64::new(1),
        })
    }

    pub(crate) fn subscribe(
        &self,
        source: QuerySource,
        anchor: Weak<()>,
        callback: NotificationCallback,
    ) -> RealmResult<NotificationToken> {
        let subscription = Arc::new(Subscription {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            source,
            anchor,
            active: AtomicBool::new(true),
            callback: Mutex::new(Some(callback)),
            worker: self.worker_id,
        });
        self.sender
            .send(NotifierMessage::Subscribe(Arc::clone(&subscription)))
            .map_err(|_| RealmError::Closed)?;
        log_notifications_debug!("Registered notification subscription {}", subscription.id);
        Ok(NotificationToken { subscription })
    }

    pub(crate) fn commit(&self, version: u64) {
        if self.sender.send(NotifierMessage::Commit(version)).is_err() {
            log_notifications_warn!("Notifier stopped; commit {} not delivered", version);
        }
    }

    pub(crate) fn shutdown(&self) {
        let _ = self.sender.send(NotifierMessage::Shutdown);
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            // the last handle can be released from inside a callback
            if thread::current().id() != self.worker_id {
                let _ = worker.join();
            }
        }
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(receiver: Receiver<NotifierMessage>) {
    let mut registered: Vec<Registered> = Vec::new();

    while let Ok(message) = receiver.recv() {
        match message {
            NotifierMessage::Subscribe(subscription) => match subscription.source.evaluate() {
                Ok(snapshot) => {
                    if subscription.deliver(Ok(())) {
                        registered.push(Registered {
                            subscription,
                            last: snapshot,
                        });
                    }
                }
                Err(e) => {
                    subscription.deliver(Err(e));
                }
            },
            NotifierMessage::Commit(version) => {
                registered.retain(|r| r.subscription.is_live());
                log_notifications_trace!(
                    "Re-evaluating {} live queries for commit {}",
                    registered.len(),
                    version
                );
                registered.retain_mut(|entry| match entry.subscription.source.evaluate() {
                    Ok(snapshot) if snapshot == entry.last => true,
                    Ok(snapshot) => {
                        entry.last = snapshot;
                        entry.subscription.deliver(Ok(()))
                    }
                    Err(e) => {
                        entry.subscription.deliver(Err(e));
                        false
                    }
                });
            }
            NotifierMessage::Shutdown => break,
        }
    }

    for entry in registered {
        entry.subscription.deliver(Err(RealmError::Closed));
    }
}
