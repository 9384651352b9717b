//! Per-module views: namespace-aware dispatch/commit plus lazily scoped
//! getters and state.

use crate::error::Result;
use crate::store::{Getters, Store};
use crate::types::{ActionRequest, CallOptions, MutationRequest};
use serde_json::Value;
use tracing::warn;

/// A module's local view of the store.
///
/// Dispatch and commit prefix the requested type with the module's namespace
/// (unless told to target the root); getters and state are resolved lazily on
/// each access, never snapshotted. With an empty namespace every call is
/// identical to the store's root method.
#[derive(Clone)]
pub struct LocalContext {
    store: Store,
    namespace: String,
    path: Vec<String>,
}

impl LocalContext {
    pub(crate) fn new(store: Store, namespace: String, path: Vec<String>) -> Self {
        Self {
            store,
            namespace,
            path,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Dispatch an action, prefixing its type with this module's namespace.
    pub async fn dispatch(&self, request: impl Into<ActionRequest>) -> Result<Option<Value>> {
        self.dispatch_with(request, CallOptions::default()).await
    }

    /// Dispatch with explicit options; `root: true` skips namespace
    /// prefixing.
    pub async fn dispatch_with(
        &self,
        request: impl Into<ActionRequest>,
        options: CallOptions,
    ) -> Result<Option<Value>> {
        let mut request = request.into();
        if !options.root && !self.namespace.is_empty() {
            let global = format!("{}{}", self.namespace, request.kind);
            if !self.store.has_action(&global) {
                warn!(local = %request.kind, global = %global, "unknown local action type");
                return Ok(None);
            }
            request.kind = global;
        }
        self.store.dispatch(request).await
    }

    /// Commit a mutation, prefixing its type with this module's namespace.
    pub fn commit(&self, request: impl Into<MutationRequest>) -> Result<()> {
        self.commit_with(request, CallOptions::default())
    }

    /// Commit with explicit options; `root: true` skips namespace prefixing.
    pub fn commit_with(
        &self,
        request: impl Into<MutationRequest>,
        options: CallOptions,
    ) -> Result<()> {
        let mut request = request.into();
        if !options.root && !self.namespace.is_empty() {
            let global = format!("{}{}", self.namespace, request.kind);
            if !self.store.has_mutation(&global) {
                warn!(local = %request.kind, global = %global, "unknown local mutation type");
                return Ok(());
            }
            request.kind = global;
        }
        self.store.commit(request)
    }

    /// This module's state slice, resolved by walking its path from the root
    /// state tree on each access.
    pub fn state(&self) -> Value {
        self.store.resolve_state(&self.path)
    }

    /// Namespace-scoped view over the root getters.
    pub fn getters(&self) -> LocalGetters {
        LocalGetters {
            store: self.store.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

/// The context handed to action handlers: the module-local view plus root
/// escape hatches.
#[derive(Clone)]
pub struct ActionContext {
    local: LocalContext,
}

impl ActionContext {
    pub(crate) fn new(store: Store, namespace: String, path: Vec<String>) -> Self {
        Self {
            local: LocalContext::new(store, namespace, path),
        }
    }

    pub async fn dispatch(&self, request: impl Into<ActionRequest>) -> Result<Option<Value>> {
        self.local.dispatch(request).await
    }

    pub async fn dispatch_with(
        &self,
        request: impl Into<ActionRequest>,
        options: CallOptions,
    ) -> Result<Option<Value>> {
        self.local.dispatch_with(request, options).await
    }

    pub fn commit(&self, request: impl Into<MutationRequest>) -> Result<()> {
        self.local.commit(request)
    }

    pub fn commit_with(
        &self,
        request: impl Into<MutationRequest>,
        options: CallOptions,
    ) -> Result<()> {
        self.local.commit_with(request, options)
    }

    /// Local state slice.
    pub fn state(&self) -> Value {
        self.local.state()
    }

    /// Namespace-scoped getters.
    pub fn getters(&self) -> LocalGetters {
        self.local.getters()
    }

    /// Evaluate one local getter.
    pub fn getter(&self, name: &str) -> Option<Value> {
        self.local.getters().get(name)
    }

    /// The whole state tree.
    pub fn root_state(&self) -> Value {
        self.local.store.state()
    }

    /// Unscoped view over every registered getter.
    pub fn root_getters(&self) -> Getters {
        self.local.store.getters()
    }
}

/// The context handed to getter functions.
pub struct GetterContext {
    store: Store,
    namespace: String,
    path: Vec<String>,
}

impl GetterContext {
    pub(crate) fn new(store: Store, namespace: String, path: Vec<String>) -> Self {
        Self {
            store,
            namespace,
            path,
        }
    }

    /// The owning module's state slice.
    pub fn state(&self) -> Value {
        self.store.resolve_state(&self.path)
    }

    /// The whole state tree.
    pub fn root_state(&self) -> Value {
        self.store.state()
    }

    /// Evaluate a sibling getter by its local (unprefixed) name.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.store.getter(&format!("{}{}", self.namespace, name))
    }

    /// Evaluate a getter by its fully qualified name.
    pub fn root_getter(&self, name: &str) -> Option<Value> {
        self.store.getter(name)
    }
}

/// Lazily evaluated, namespace-scoped view over the root getters.
///
/// Its keys are the suffixes of every root getter key beginning with this
/// module's namespace prefix; evaluation is forwarded to the root getter on
/// access.
#[derive(Clone)]
pub struct LocalGetters {
    store: Store,
    namespace: String,
}

impl LocalGetters {
    /// Evaluate the getter registered under `namespace + name`.
    pub fn get(&self, name: &str) -> Option<Value> {
        if self.namespace.is_empty() {
            self.store.getter(name)
        } else {
            self.store.getter(&format!("{}{}", self.namespace, name))
        }
    }

    /// Local (prefix-stripped) keys visible through this view.
    pub fn keys(&self) -> Vec<String> {
        self.store
            .getter_keys()
            .into_iter()
            .filter_map(|key| {
                key.strip_prefix(self.namespace.as_str())
                    .map(|suffix| suffix.to_string())
            })
            .collect()
    }
}
