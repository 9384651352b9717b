//! Recursive installer: flattens the module tree into the store's registries.

use crate::module::{ModuleNode, ModuleTree};
use crate::store::{ActionEntry, GetterEntry, MutationEntry, Store};
use crate::types::display_path;
use std::collections::hash_map::Entry;
use tracing::{debug, warn};

/// Install the subtree rooted at `path` into the store's flat registries.
///
/// Invoked with an empty path at construction and on every full reset, and
/// with the registered module's path on `register_module`. `skip_state` makes
/// this a behavior-only pass: no state slices are grafted (hot reload and
/// `preserve_state` registrations).
pub(crate) fn install(store: &Store, path: &[String], skip_state: bool) -> crate::Result<()> {
    debug!(at = %display_path(path), skip_state, "installing module subtree");
    let inner = store.inner();
    let tree = inner.tree.read();
    install_node(store, &tree, path, skip_state)
}

fn install_node(
    store: &Store,
    tree: &ModuleTree,
    path: &[String],
    skip_state: bool,
) -> crate::Result<()> {
    let node = tree.get(path)?;
    let namespace = tree.get_namespace(path)?;
    let is_root = path.is_empty();
    let inner = store.inner();

    // Namespace map is last-write-wins.
    if node.namespaced {
        inner
            .registries
            .write()
            .namespaces
            .insert(namespace.clone(), path.to_vec());
    }

    if !is_root && !skip_state {
        inner.graft_state(path, node.state.clone())?;
    }

    register_node(store, node, &namespace, path);

    for (key, _) in node.children() {
        let mut child_path = path.to_vec();
        child_path.push(key.clone());
        install_node(store, tree, &child_path, skip_state)?;
    }
    Ok(())
}

fn register_node(store: &Store, node: &ModuleNode, namespace: &str, path: &[String]) {
    let inner = store.inner();
    let mut registries = inner.registries.write();

    for (key, handler) in &node.mutations {
        let global = format!("{namespace}{key}");
        registries.mutations.entry(global).or_default().push(MutationEntry {
            path: path.to_vec(),
            handler: handler.clone(),
        });
    }

    for (key, action) in &node.actions {
        let global = if action.root {
            key.clone()
        } else {
            format!("{namespace}{key}")
        };
        registries.actions.entry(global).or_default().push(ActionEntry {
            namespace: namespace.to_string(),
            path: path.to_vec(),
            handler: action.handler.clone(),
        });
    }

    // Getter registry is first-write-wins; duplicates are discarded with a
    // diagnostic.
    for (key, raw) in &node.getters {
        let global = format!("{namespace}{key}");
        match registries.getters.entry(global) {
            Entry::Occupied(occupied) => {
                warn!(key = %occupied.key(), "duplicate getter key; keeping the first registration");
            }
            Entry::Vacant(vacant) => {
                vacant.insert(GetterEntry {
                    namespace: namespace.to_string(),
                    path: path.to_vec(),
                    raw: raw.clone(),
                });
            }
        }
    }
}
