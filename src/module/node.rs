//! Tree node holding one module's behavior maps and state slice.

use crate::config::{Action, GetterFn, ModuleConfig, MutationFn};
use serde_json::Value;

/// One module in the hierarchy.
///
/// A node owns its initial state slice until the installer grafts it into the
/// global state tree; after that the global tree is the source of truth. The
/// node's identity is its path at a point in time, not a stable handle.
pub(crate) struct ModuleNode {
    /// True if created via dynamic registration; static modules refuse
    /// unregistration.
    pub(crate) runtime: bool,
    pub(crate) namespaced: bool,
    pub(crate) state: Value,
    pub(crate) getters: Vec<(String, GetterFn)>,
    pub(crate) mutations: Vec<(String, MutationFn)>,
    pub(crate) actions: Vec<(String, Action)>,
    children: Vec<(String, ModuleNode)>,
}

impl ModuleNode {
    /// Build a node from a descriptor. Nested module declarations are not
    /// consumed here; the tree recurses into them separately.
    pub(crate) fn new(config: &ModuleConfig, runtime: bool) -> Self {
        Self {
            runtime,
            namespaced: config.namespaced,
            state: config.initial_state(),
            getters: config.getters.clone(),
            mutations: config.mutations.clone(),
            actions: config.actions.clone(),
            children: Vec::new(),
        }
    }

    pub(crate) fn add_child(&mut self, key: &str, node: ModuleNode) {
        // Re-registering an existing key replaces the previous child.
        if let Some(slot) = self.children.iter_mut().find(|(k, _)| k == key) {
            slot.1 = node;
        } else {
            self.children.push((key.to_string(), node));
        }
    }

    pub(crate) fn remove_child(&mut self, key: &str) -> Option<ModuleNode> {
        let index = self.children.iter().position(|(k, _)| k == key)?;
        Some(self.children.remove(index).1)
    }

    pub(crate) fn get_child(&self, key: &str) -> Option<&ModuleNode> {
        self.children.iter().find(|(k, _)| k == key).map(|(_, n)| n)
    }

    pub(crate) fn get_child_mut(&mut self, key: &str) -> Option<&mut ModuleNode> {
        self.children
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, n)| n)
    }

    pub(crate) fn has_child(&self, key: &str) -> bool {
        self.children.iter().any(|(k, _)| k == key)
    }

    /// Children in registration order.
    pub(crate) fn children(&self) -> impl Iterator<Item = (&String, &ModuleNode)> {
        self.children.iter().map(|(k, n)| (k, n))
    }

    /// Replace behavior maps in place (hot update). The `namespaced` flag is
    /// always taken from the new config; behavior maps only when the new
    /// config declares any entries. State and children are never touched.
    pub(crate) fn update(&mut self, config: &ModuleConfig) {
        self.namespaced = config.namespaced;
        if !config.getters.is_empty() {
            self.getters = config.getters.clone();
        }
        if !config.mutations.is_empty() {
            self.mutations = config.mutations.clone();
        }
        if !config.actions.is_empty() {
            self.actions = config.actions.clone();
        }
    }
}
