//! Explicit-memoization substrate: state versioning, getter caching, watchers.
//!
//! Replaces an implicit dependency-tracking layer with a single monotonically
//! increasing version counter. Every committed change bumps the version;
//! getters are cached per `(key, version)` and watchers are re-evaluated
//! synchronously after each bump. Coarser invalidation than a dependency
//! graph, consistent with the single-threaded execution model.

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::store::Getters;

/// Getter cache keyed by global getter name, valid for a single version.
pub(crate) struct VersionedCache {
    version: AtomicU64,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

struct CacheEntry {
    version: u64,
    value: Value,
}

impl VersionedCache {
    pub(crate) fn new() -> Self {
        Self {
            version: AtomicU64::new(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Invalidate every cached value by advancing the version.
    pub(crate) fn bump(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Current-version hit, or None when absent or stale.
    pub(crate) fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if entry.version == self.version() {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    pub(crate) fn put(&self, key: &str, value: Value) {
        let version = self.version();
        self.entries
            .write()
            .insert(key.to_string(), CacheEntry { version, value });
    }

    /// Drop all entries (registry reset / hot update).
    pub(crate) fn clear(&self) {
        self.entries.write().clear();
    }
}

type WatchReadFn = Arc<dyn Fn(&Value, &Getters) -> Value + Send + Sync>;
type WatchCallbackFn = Arc<dyn Fn(&Value, &Value) + Send + Sync>;

struct Watcher {
    id: u64,
    read: WatchReadFn,
    callback: WatchCallbackFn,
    last: Value,
}

/// Registered watchers, re-evaluated after every committed change.
pub(crate) struct WatcherSet {
    watchers: Mutex<Vec<Watcher>>,
    next_id: AtomicU64,
}

impl WatcherSet {
    pub(crate) fn new() -> Self {
        Self {
            watchers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a watcher seeded with its initial value; the callback fires
    /// on change only.
    pub(crate) fn add(
        self: &Arc<Self>,
        initial: Value,
        read: WatchReadFn,
        callback: WatchCallbackFn,
    ) -> WatchHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.watchers.lock().push(Watcher {
            id,
            read,
            callback,
            last: initial,
        });
        WatchHandle {
            id,
            set: Arc::clone(self),
        }
    }

    fn remove(&self, id: u64) {
        self.watchers.lock().retain(|w| w.id != id);
    }

    /// Re-evaluate every watcher against the given state and getters, firing
    /// callbacks whose read value changed.
    ///
    /// Last-seen values are written back before any callback runs, so a
    /// callback that commits (re-entering this method) observes fresh
    /// baselines. No lock is held while user code executes.
    pub(crate) fn run(&self, state: &Value, getters: &Getters) {
        let snapshot: Vec<(u64, WatchReadFn, WatchCallbackFn, Value)> = self
            .watchers
            .lock()
            .iter()
            .map(|w| (w.id, Arc::clone(&w.read), Arc::clone(&w.callback), w.last.clone()))
            .collect();

        let mut fired = Vec::new();
        for (id, read, callback, last) in snapshot {
            let current = read(state, getters);
            if current != last {
                fired.push((id, callback, current, last));
            }
        }

        {
            let mut watchers = self.watchers.lock();
            for (id, _, current, _) in &fired {
                if let Some(w) = watchers.iter_mut().find(|w| w.id == *id) {
                    w.last = current.clone();
                }
            }
        }

        for (_, callback, current, last) in fired {
            callback(&current, &last);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.watchers.lock().len()
    }
}

/// Handle returned by [`crate::Store::watch`]; stops the watcher on demand.
pub struct WatchHandle {
    id: u64,
    set: Arc<WatcherSet>,
}

impl WatchHandle {
    pub fn stop(self) {
        self.set.remove(self.id);
    }
}
