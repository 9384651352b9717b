//! Subscriber registries and the channel-based event stream.

use crate::error::Result;
use crate::types::{ActionRecord, MutationRecord};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Mutation subscriber: invoked after every commit with the mutation record
/// and the post-commit state. An `Err` is logged and isolated.
pub type MutationSubscriberFn = dyn Fn(&MutationRecord, &Value) -> Result<()> + Send + Sync;

/// Action subscriber callback: invoked with the action record and the state
/// at notification time.
pub type ActionSubscriberFn = dyn Fn(&ActionRecord, &Value) -> Result<()> + Send + Sync;

/// An action subscriber: a `before` hook (runs before the handler starts),
/// an `after` hook (runs after a successful completion), or both.
pub struct ActionSubscriber {
    pub(crate) before: Option<Arc<ActionSubscriberFn>>,
    pub(crate) after: Option<Arc<ActionSubscriberFn>>,
}

impl ActionSubscriber {
    pub fn before<F>(f: F) -> Self
    where
        F: Fn(&ActionRecord, &Value) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            before: Some(Arc::new(f)),
            after: None,
        }
    }

    pub fn after<F>(f: F) -> Self
    where
        F: Fn(&ActionRecord, &Value) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            before: None,
            after: Some(Arc::new(f)),
        }
    }

    pub fn around<B, A>(before: B, after: A) -> Self
    where
        B: Fn(&ActionRecord, &Value) -> Result<()> + Send + Sync + 'static,
        A: Fn(&ActionRecord, &Value) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            before: Some(Arc::new(before)),
            after: Some(Arc::new(after)),
        }
    }
}

/// Ordered subscriber list with handle-based removal.
pub(crate) struct SubscriberSet<T: ?Sized> {
    entries: RwLock<Vec<(u64, Arc<T>)>>,
    next_id: AtomicU64,
}

impl<T: ?Sized> SubscriberSet<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn add(&self, subscriber: Arc<T>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.entries.write().push((id, subscriber));
        id
    }

    pub(crate) fn remove(&self, id: u64) {
        self.entries.write().retain(|(entry_id, _)| *entry_id != id);
    }

    /// Subscribers in subscription order; cloned out so no lock is held
    /// while they run.
    pub(crate) fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries.read().iter().map(|(_, s)| Arc::clone(s)).collect()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

/// Handle returned by `subscribe` / `subscribe_action`; removes exactly the
/// entry it created.
pub struct SubscriptionHandle {
    id: u64,
    remove: Box<dyn FnOnce() + Send>,
}

impl SubscriptionHandle {
    pub(crate) fn new(id: u64, remove: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id,
            remove: Box::new(remove),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unsubscribe(self) {
        (self.remove)();
    }
}

/// Events emitted on the store's event streams, for external tooling
/// (devtools, persistence plugins, time-travel recorders).
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    /// A mutation was committed.
    Mutation {
        kind: String,
        payload: Option<Value>,
    },

    /// An action was dispatched and its handlers are starting.
    ActionStart {
        kind: String,
        payload: Option<Value>,
    },

    /// Every handler for a dispatched action completed successfully.
    ActionDone { kind: String },

    /// A dispatched action failed.
    ActionFailed { kind: String, error: String },

    /// The whole state tree was replaced.
    StateReplaced,

    /// A module was dynamically registered.
    ModuleRegistered { path: String },

    /// A module was dynamically unregistered.
    ModuleUnregistered { path: String },

    /// Behavior definitions were hot-replaced.
    HotUpdated,

    /// The stream is closing because the consumer fell behind.
    Dropped,
}

/// A bounded receiver of [`StoreEvent`]s. Slow consumers are dropped when
/// their buffer overflows.
pub struct EventStream {
    pub(crate) id: u64,
    receiver: Receiver<StoreEvent>,
}

impl EventStream {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> std::result::Result<StoreEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> std::result::Result<StoreEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> std::result::Result<StoreEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Fan-out of store events to bounded channels.
pub(crate) struct EventBroadcaster {
    senders: RwLock<HashMap<u64, Sender<StoreEvent>>>,
    next_id: AtomicU64,
}

impl EventBroadcaster {
    pub(crate) fn new() -> Self {
        Self {
            senders: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn stream(&self, buffer: usize) -> EventStream {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = bounded(buffer);
        self.senders.write().insert(id, sender);
        EventStream { id, receiver }
    }

    pub(crate) fn close(&self, id: u64) {
        self.senders.write().remove(&id);
    }

    /// Send to every stream; streams that are full or disconnected are
    /// removed (a full stream gets a best-effort `Dropped` notice).
    pub(crate) fn broadcast(&self, event: StoreEvent) {
        let mut to_remove = Vec::new();
        {
            let senders = self.senders.read();
            if senders.is_empty() {
                return;
            }
            for (id, sender) in senders.iter() {
                if sender.try_send(event.clone()).is_err() {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut senders = self.senders.write();
            for id in to_remove {
                if let Some(sender) = senders.remove(&id) {
                    let _ = sender.try_send(StoreEvent::Dropped);
                }
            }
        }
    }

    #[cfg(test)]
    fn stream_count(&self) -> usize {
        self.senders.read().len()
    }
}
