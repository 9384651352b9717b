//! Main Store struct tying all components together.

use crate::config::{ActionFn, GetterFn, ModuleConfig, MutationFn};
use crate::context::{ActionContext, GetterContext};
use crate::error::{Result, StoreError};
use crate::install;
use crate::module::ModuleTree;
use crate::reactive::{VersionedCache, WatchHandle, WatcherSet};
use crate::subscriptions::{
    ActionSubscriber, EventBroadcaster, EventStream, MutationSubscriberFn, StoreEvent,
    SubscriberSet, SubscriptionHandle,
};
use crate::types::{
    display_path, resolve, resolve_mut, ActionRecord, ActionRequest, MutationRecord,
    MutationRequest,
};
use futures::future::{join_all, BoxFuture};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Hook notified whenever an action handler's completion fails, before the
/// failure propagates to the dispatch caller.
pub trait Diagnostics: Send + Sync {
    fn action_failed(&self, kind: &str, error: &StoreError);
}

/// Options for [`Store::register_module_with`].
#[derive(Clone, Copy, Debug, Default)]
pub struct RegisterOptions {
    /// Skip grafting the module's initial state, keeping whatever the global
    /// tree already holds at that path (restoring hydrated state).
    pub preserve_state: bool,
}

/// A registered mutation handler plus the path used to resolve its module's
/// local state slice at invocation time.
#[derive(Clone)]
pub(crate) struct MutationEntry {
    pub(crate) path: Vec<String>,
    pub(crate) handler: MutationFn,
}

/// A registered action handler plus its local-context seed.
#[derive(Clone)]
pub(crate) struct ActionEntry {
    pub(crate) namespace: String,
    pub(crate) path: Vec<String>,
    pub(crate) handler: ActionFn,
}

/// A registered getter plus its local-context seed.
#[derive(Clone)]
pub(crate) struct GetterEntry {
    pub(crate) namespace: String,
    pub(crate) path: Vec<String>,
    pub(crate) raw: GetterFn,
}

/// Flat registries keyed by fully namespace-qualified type strings. Rebuilt
/// wholesale on every structural change.
#[derive(Default)]
pub(crate) struct Registries {
    pub(crate) mutations: HashMap<String, Vec<MutationEntry>>,
    pub(crate) actions: HashMap<String, Vec<ActionEntry>>,
    pub(crate) getters: HashMap<String, GetterEntry>,
    pub(crate) namespaces: HashMap<String, Vec<String>>,
}

/// Scoped committing marker: saves the flag, sets it, restores the previous
/// value on every exit path.
///
/// This is a single-threaded critical-section marker, not a lock; it is not
/// safe if multiple logical mutation flows interleave across true
/// concurrency.
pub(crate) struct CommitGuard<'a> {
    flag: &'a AtomicBool,
    prev: bool,
}

impl<'a> CommitGuard<'a> {
    pub(crate) fn new(flag: &'a AtomicBool) -> Self {
        let prev = flag.swap(true, Ordering::SeqCst);
        Self { flag, prev }
    }
}

impl Drop for CommitGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(self.prev, Ordering::SeqCst);
    }
}

pub(crate) struct StoreInner {
    pub(crate) tree: RwLock<ModuleTree>,
    pub(crate) state: RwLock<Value>,
    pub(crate) registries: RwLock<Registries>,
    cache: VersionedCache,
    watchers: Arc<WatcherSet>,
    mutation_subscribers: Arc<SubscriberSet<MutationSubscriberFn>>,
    action_subscribers: Arc<SubscriberSet<ActionSubscriber>>,
    events: EventBroadcaster,
    committing: AtomicBool,
    strict: bool,
    strict_violations: AtomicU64,
    diagnostics: Option<Arc<dyn Diagnostics>>,
}

impl StoreInner {
    /// Record a state change: strict-mode check plus cache invalidation.
    /// Every sanctioned write path calls this while holding the committing
    /// guard.
    pub(crate) fn touch(&self) {
        if self.strict && !self.committing.load(Ordering::SeqCst) {
            self.strict_violations.fetch_add(1, Ordering::SeqCst);
            warn!("state changed outside of a mutation commit");
        }
        self.cache.bump();
    }

    /// Graft a module's state slice into its parent slice, inside the
    /// committing guard.
    pub(crate) fn graft_state(&self, path: &[String], slice: Value) -> Result<()> {
        let (key, parent_path) = path.split_last().expect("graft path is never the root");
        let _guard = CommitGuard::new(&self.committing);
        let mut state = self.state.write();
        let parent = resolve_mut(&mut state, parent_path)
            .ok_or_else(|| StoreError::ModuleNotFound(display_path(parent_path)))?;
        let map = parent.as_object_mut().ok_or_else(|| {
            StoreError::InvalidState(format!(
                "state at '{}' is not an object; cannot graft '{}' into it",
                display_path(parent_path),
                key
            ))
        })?;
        map.insert(key.clone(), slice);
        drop(state);
        self.touch();
        Ok(())
    }

    /// Remove a module's state slice from its parent, inside the committing
    /// guard.
    fn prune_state(&self, path: &[String]) {
        let (key, parent_path) = match path.split_last() {
            Some(split) => split,
            None => return,
        };
        let _guard = CommitGuard::new(&self.committing);
        let mut state = self.state.write();
        if let Some(map) = resolve_mut(&mut state, parent_path).and_then(Value::as_object_mut) {
            map.remove(key);
        }
        drop(state);
        self.touch();
    }
}

/// Configures and builds a [`Store`].
pub struct StoreBuilder {
    config: ModuleConfig,
    strict: bool,
    plugins: Vec<Box<dyn FnOnce(&Store) + Send>>,
    diagnostics: Option<Arc<dyn Diagnostics>>,
}

impl StoreBuilder {
    /// Enable strict mode: state changes observed outside the committing
    /// guard are counted and logged (diagnostic only, never an abort).
    pub fn strict(mut self, yes: bool) -> Self {
        self.strict = yes;
        self
    }

    /// Register a plugin, invoked once with the store after construction.
    pub fn plugin<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&Store) + Send + 'static,
    {
        self.plugins.push(Box::new(f));
        self
    }

    /// Attach the diagnostics hook for action failures.
    pub fn diagnostics(mut self, hook: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = Some(hook);
        self
    }

    pub fn build(self) -> Result<Store> {
        let tree = ModuleTree::new(&self.config)?;
        let root_state = tree.get(&[])?.state.clone();

        let store = Store {
            inner: Arc::new(StoreInner {
                tree: RwLock::new(tree),
                state: RwLock::new(root_state),
                registries: RwLock::new(Registries::default()),
                cache: VersionedCache::new(),
                watchers: Arc::new(WatcherSet::new()),
                mutation_subscribers: Arc::new(SubscriberSet::new()),
                action_subscribers: Arc::new(SubscriberSet::new()),
                events: EventBroadcaster::new(),
                committing: AtomicBool::new(false),
                strict: self.strict,
                strict_violations: AtomicU64::new(0),
                diagnostics: self.diagnostics,
            }),
        };

        install::install(&store, &[], false)?;

        for plugin in self.plugins {
            plugin(&store);
        }
        Ok(store)
    }
}

/// The hierarchical state container.
///
/// Holds the flat mutation/action/getter registries, the global state tree,
/// and the subscriber lists. Cheap to clone; clones share the same store.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Build a store from the root module configuration with defaults.
    pub fn new(config: ModuleConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: ModuleConfig) -> StoreBuilder {
        StoreBuilder {
            config,
            strict: false,
            plugins: Vec::new(),
            diagnostics: None,
        }
    }

    pub(crate) fn inner(&self) -> &StoreInner {
        &self.inner
    }

    // --- State Access ---

    /// Snapshot of the whole state tree.
    pub fn state(&self) -> Value {
        self.inner.state.read().clone()
    }

    /// Snapshot of the state slice at a module path (`Null` when absent).
    pub fn state_at(&self, path: &[&str]) -> Value {
        let path: Vec<String> = path.iter().map(|s| s.to_string()).collect();
        self.resolve_state(&path)
    }

    pub(crate) fn resolve_state(&self, path: &[String]) -> Value {
        let state = self.inner.state.read();
        resolve(&state, path).cloned().unwrap_or(Value::Null)
    }

    /// Current state version; bumped on every committed change.
    pub fn version(&self) -> u64 {
        self.inner.cache.version()
    }

    /// Number of strict-mode violations observed so far.
    pub fn strict_violations(&self) -> u64 {
        self.inner.strict_violations.load(Ordering::SeqCst)
    }

    /// Swap the whole state tree, inside the committing guard.
    pub fn replace_state(&self, new_state: Value) {
        {
            let _guard = CommitGuard::new(&self.inner.committing);
            *self.inner.state.write() = new_state;
            self.inner.touch();
        }
        self.inner.events.broadcast(StoreEvent::StateReplaced);
        self.run_watchers();
    }

    // --- Registry Queries ---

    pub fn has_mutation(&self, kind: &str) -> bool {
        self.inner.registries.read().mutations.contains_key(kind)
    }

    pub fn has_action(&self, kind: &str) -> bool {
        self.inner.registries.read().actions.contains_key(kind)
    }

    pub fn has_getter(&self, key: &str) -> bool {
        self.inner.registries.read().getters.contains_key(key)
    }

    /// Path of the module registered under a namespace (last write wins).
    pub fn namespace_path(&self, namespace: &str) -> Option<Vec<String>> {
        self.inner.registries.read().namespaces.get(namespace).cloned()
    }

    // --- Getters ---

    /// Evaluate a getter by its fully qualified key, memoized per state
    /// version.
    pub fn getter(&self, key: &str) -> Option<Value> {
        if let Some(cached) = self.inner.cache.get(key) {
            return Some(cached);
        }
        let entry = self.inner.registries.read().getters.get(key).cloned()?;
        let context = GetterContext::new(self.clone(), entry.namespace, entry.path);
        let value = (entry.raw)(&context);
        self.inner.cache.put(key, value.clone());
        Some(value)
    }

    /// All registered getter keys, sorted.
    pub fn getter_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.registries.read().getters.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Unscoped view over every registered getter.
    pub fn getters(&self) -> Getters {
        Getters {
            store: self.clone(),
        }
    }

    // --- Commit / Dispatch ---

    /// Commit a mutation: run every handler registered for the type in
    /// registration order inside the committing guard, then notify mutation
    /// subscribers with the record and the post-commit state.
    ///
    /// An unknown type is a logged no-op. A handler error aborts the
    /// remaining handlers and propagates; subscribers are not notified.
    /// Writes made by earlier handlers persist on failure, so the state
    /// version advances whether or not the commit succeeded.
    pub fn commit(&self, request: impl Into<MutationRequest>) -> Result<()> {
        let request = request.into();
        let entries: Vec<MutationEntry> = {
            let registries = self.inner.registries.read();
            match registries.mutations.get(&request.kind) {
                None => {
                    warn!(kind = %request.kind, "unknown mutation type");
                    return Ok(());
                }
                Some(list) => list.clone(),
            }
        };

        {
            let _guard = CommitGuard::new(&self.inner.committing);
            let mut state = self.inner.state.write();
            let mut outcome = Ok(());
            for entry in &entries {
                let run = resolve_mut(&mut state, &entry.path)
                    .ok_or_else(|| StoreError::ModuleNotFound(display_path(&entry.path)))
                    .and_then(|slice| (entry.handler)(slice, request.payload.as_ref()));
                if run.is_err() {
                    outcome = run;
                    break;
                }
            }
            drop(state);
            // A failed handler does not undo earlier handlers' writes; the
            // version must advance either way or cached getters go stale.
            self.inner.touch();
            outcome?;
        }

        let record = MutationRecord {
            kind: request.kind,
            payload: request.payload,
        };
        let snapshot = self.state();
        for subscriber in self.inner.mutation_subscribers.snapshot() {
            if let Err(error) = subscriber(&record, &snapshot) {
                warn!(kind = %record.kind, %error, "mutation subscriber failed");
            }
        }
        self.inner.events.broadcast(StoreEvent::Mutation {
            kind: record.kind.clone(),
            payload: record.payload.clone(),
        });
        self.run_watchers();
        Ok(())
    }

    /// Dispatch an action.
    ///
    /// An unknown type is a logged no-op resolving to `None`. With one
    /// registered handler the result is its value; with several, every
    /// handler is driven to completion even when a sibling fails, and the
    /// results combine into an array in registration order (the first
    /// failure, by that order, fails the whole dispatch).
    /// "Before" subscribers run ahead of the handlers and "after" subscribers
    /// only on success; subscriber errors are isolated and logged.
    pub async fn dispatch(&self, request: impl Into<ActionRequest>) -> Result<Option<Value>> {
        let request = request.into();
        let entries: Vec<ActionEntry> = {
            let registries = self.inner.registries.read();
            match registries.actions.get(&request.kind) {
                None => {
                    warn!(kind = %request.kind, "unknown action type");
                    return Ok(None);
                }
                Some(list) => list.clone(),
            }
        };

        let record = ActionRecord {
            kind: request.kind.clone(),
            payload: request.payload.clone(),
        };
        let snapshot = self.state();
        for subscriber in self.inner.action_subscribers.snapshot() {
            if let Some(before) = &subscriber.before {
                if let Err(error) = before(&record, &snapshot) {
                    warn!(kind = %record.kind, %error, "before action subscriber failed");
                }
            }
        }
        self.inner.events.broadcast(StoreEvent::ActionStart {
            kind: record.kind.clone(),
            payload: record.payload.clone(),
        });

        let result = if entries.len() == 1 {
            self.invoke_action(&entries[0], &request).await
        } else {
            // A failing handler must not cancel its siblings; their effects
            // still land.
            let settled = join_all(
                entries
                    .iter()
                    .map(|entry| self.invoke_action(entry, &request)),
            )
            .await;
            let mut values = Vec::with_capacity(settled.len());
            let mut failure = None;
            for outcome in settled {
                match outcome {
                    Ok(value) => values.push(value),
                    Err(error) if failure.is_none() => failure = Some(error),
                    Err(_) => {}
                }
            }
            match failure {
                Some(error) => Err(error),
                None => Ok(Value::Array(values)),
            }
        };

        match result {
            Ok(value) => {
                let snapshot = self.state();
                for subscriber in self.inner.action_subscribers.snapshot() {
                    if let Some(after) = &subscriber.after {
                        if let Err(error) = after(&record, &snapshot) {
                            warn!(kind = %record.kind, %error, "after action subscriber failed");
                        }
                    }
                }
                self.inner.events.broadcast(StoreEvent::ActionDone {
                    kind: record.kind.clone(),
                });
                Ok(Some(value))
            }
            Err(error) => {
                self.inner.events.broadcast(StoreEvent::ActionFailed {
                    kind: record.kind.clone(),
                    error: error.to_string(),
                });
                Err(error)
            }
        }
    }

    /// Invoke one action handler with its module-scoped context. A failed
    /// completion is reported to the diagnostics hook before it propagates.
    fn invoke_action(
        &self,
        entry: &ActionEntry,
        request: &ActionRequest,
    ) -> BoxFuture<'static, Result<Value>> {
        let context = ActionContext::new(self.clone(), entry.namespace.clone(), entry.path.clone());
        let future = (entry.handler)(context, request.payload.clone());
        let diagnostics = self.inner.diagnostics.clone();
        let kind = request.kind.clone();
        Box::pin(async move {
            match future.await {
                Ok(value) => Ok(value),
                Err(error) => {
                    if let Some(hook) = &diagnostics {
                        hook.action_failed(&kind, &error);
                    }
                    Err(error)
                }
            }
        })
    }

    // --- Subscriptions ---

    /// Subscribe to committed mutations, notified in subscription order with
    /// the mutation record and the post-commit state.
    pub fn subscribe<F>(&self, f: F) -> SubscriptionHandle
    where
        F: Fn(&MutationRecord, &Value) -> Result<()> + Send + Sync + 'static,
    {
        let set = Arc::clone(&self.inner.mutation_subscribers);
        let id = set.add(Arc::new(f));
        SubscriptionHandle::new(id, move || set.remove(id))
    }

    /// Subscribe to dispatched actions (before/after hooks).
    pub fn subscribe_action(&self, subscriber: ActionSubscriber) -> SubscriptionHandle {
        let set = Arc::clone(&self.inner.action_subscribers);
        let id = set.add(Arc::new(subscriber));
        SubscriptionHandle::new(id, move || set.remove(id))
    }

    /// Open a bounded event stream for external tooling.
    pub fn event_stream(&self, buffer: usize) -> EventStream {
        self.inner.events.stream(buffer)
    }

    /// Close an event stream explicitly.
    pub fn close_event_stream(&self, stream: &EventStream) {
        self.inner.events.close(stream.id);
    }

    /// Watch a derived value: `read` is re-evaluated against
    /// `(state, getters)` after every committed change and `callback` is
    /// invoked with `(new, old)` whenever the result changes.
    pub fn watch<R, C>(&self, read: R, callback: C) -> WatchHandle
    where
        R: Fn(&Value, &Getters) -> Value + Send + Sync + 'static,
        C: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        let read: Arc<dyn Fn(&Value, &Getters) -> Value + Send + Sync> = Arc::new(read);
        let initial = read(&self.state(), &self.getters());
        self.inner.watchers.add(initial, read, Arc::new(callback))
    }

    fn run_watchers(&self) {
        let state = self.state();
        let getters = self.getters();
        self.inner.watchers.run(&state, &getters);
    }

    // --- Dynamic Module Lifecycle ---

    /// Register a module at `path` at run time.
    pub fn register_module(&self, path: &[&str], config: ModuleConfig) -> Result<()> {
        self.register_module_with(path, config, RegisterOptions::default())
    }

    pub fn register_module_with(
        &self,
        path: &[&str],
        config: ModuleConfig,
        options: RegisterOptions,
    ) -> Result<()> {
        if path.is_empty() {
            return Err(StoreError::InvalidPath(
                "cannot register the root module; pass it to the store constructor".into(),
            ));
        }
        let path: Vec<String> = path.iter().map(|s| s.to_string()).collect();
        self.inner.tree.write().register(&path, &config, true)?;
        install::install(self, &path, options.preserve_state)?;

        self.inner.cache.clear();
        self.inner.cache.bump();
        self.inner.events.broadcast(StoreEvent::ModuleRegistered {
            path: display_path(&path),
        });
        self.run_watchers();
        Ok(())
    }

    /// Unregister a runtime module: remove it from the tree, delete its state
    /// slice, then rebuild every registry from the remaining tree.
    ///
    /// The full reinstall is a deliberate correctness-over-efficiency choice;
    /// incremental registry patching is not attempted.
    pub fn unregister_module(&self, path: &[&str]) -> Result<()> {
        let path: Vec<String> = path.iter().map(|s| s.to_string()).collect();
        self.inner.tree.write().unregister(&path)?;
        self.inner.prune_state(&path);
        self.reset()?;
        self.inner.events.broadcast(StoreEvent::ModuleUnregistered {
            path: display_path(&path),
        });
        self.run_watchers();
        Ok(())
    }

    /// Hot-replace behavior definitions (getters/mutations/actions and
    /// namespacing) without touching state, then rebuild every registry and
    /// force re-evaluation of all cached derived values.
    pub fn hot_update(&self, new_config: ModuleConfig) -> Result<()> {
        self.inner.tree.write().update(&new_config)?;
        self.reset()?;
        self.inner.events.broadcast(StoreEvent::HotUpdated);
        self.run_watchers();
        Ok(())
    }

    /// Clear all registries and the namespace map, reinstall the whole tree
    /// (behavior-only pass, state left as-is), and invalidate the getter
    /// cache.
    fn reset(&self) -> Result<()> {
        debug!("resetting store registries");
        *self.inner.registries.write() = Registries::default();
        install::install(self, &[], true)?;
        self.inner.cache.clear();
        self.inner.cache.bump();
        Ok(())
    }
}

/// Unscoped, lazily evaluated view over every registered getter.
#[derive(Clone)]
pub struct Getters {
    store: Store,
}

impl Getters {
    /// Evaluate the getter registered under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.store.getter(key)
    }

    /// All registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.store.getter_keys()
    }
}
