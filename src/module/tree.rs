//! Module hierarchy: registration, lookup, namespace resolution, hot update.

use super::node::ModuleNode;
use crate::config::ModuleConfig;
use crate::error::{Result, StoreError};
use crate::types::display_path;
use std::collections::HashSet;
use tracing::warn;

/// Owns the root [`ModuleNode`] and maintains the hierarchy.
pub(crate) struct ModuleTree {
    root: ModuleNode,
}

impl std::fmt::Debug for ModuleTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleTree").finish_non_exhaustive()
    }
}

impl ModuleTree {
    /// Build the tree from the static root configuration, recursively
    /// registering every declared nested module with `runtime = false`.
    pub(crate) fn new(config: &ModuleConfig) -> Result<Self> {
        let mut tree = Self {
            root: ModuleNode::new(&ModuleConfig::new(), false),
        };
        tree.register(&[], config, false)?;
        Ok(tree)
    }

    /// Validate `config`, construct a node at `path`, and recurse into nested
    /// module declarations. An empty path replaces the root.
    pub(crate) fn register(
        &mut self,
        path: &[String],
        config: &ModuleConfig,
        runtime: bool,
    ) -> Result<()> {
        validate_config(path, config)?;

        let node = ModuleNode::new(config, runtime);
        if path.is_empty() {
            self.root = node;
        } else {
            let (key, parent_path) = path.split_last().expect("path is non-empty");
            let parent = self.get_mut(parent_path)?;
            parent.add_child(key, node);
        }

        for (key, child) in &config.modules {
            let mut child_path = path.to_vec();
            child_path.push(key.clone());
            self.register(&child_path, child, runtime)?;
        }
        Ok(())
    }

    /// Walk children by key from the root.
    pub(crate) fn get(&self, path: &[String]) -> Result<&ModuleNode> {
        let mut node = &self.root;
        for (depth, key) in path.iter().enumerate() {
            node = node
                .get_child(key)
                .ok_or_else(|| StoreError::ModuleNotFound(display_path(&path[..=depth])))?;
        }
        Ok(node)
    }

    fn get_mut(&mut self, path: &[String]) -> Result<&mut ModuleNode> {
        let mut node = &mut self.root;
        for (depth, key) in path.iter().enumerate() {
            node = node
                .get_child_mut(key)
                .ok_or_else(|| StoreError::ModuleNotFound(display_path(&path[..=depth])))?;
        }
        Ok(node)
    }

    /// Accumulate `key + "/"` for every descended-into module flagged
    /// `namespaced`; empty string when no ancestor along `path` is.
    pub(crate) fn get_namespace(&self, path: &[String]) -> Result<String> {
        let mut node = &self.root;
        let mut namespace = String::new();
        for (depth, key) in path.iter().enumerate() {
            node = node
                .get_child(key)
                .ok_or_else(|| StoreError::ModuleNotFound(display_path(&path[..=depth])))?;
            if node.namespaced {
                namespace.push_str(key);
                namespace.push('/');
            }
        }
        Ok(namespace)
    }

    /// Recursively merge behavior maps from `config` into existing nodes.
    /// Nested module keys with no matching child log a warning and abort that
    /// subtree; hot update never creates nodes.
    pub(crate) fn update(&mut self, config: &ModuleConfig) -> Result<()> {
        update_node(&mut Vec::new(), &mut self.root, config)
    }

    /// Remove the node named by `path` from its parent, refusing when the
    /// target was part of the static configuration.
    pub(crate) fn unregister(&mut self, path: &[String]) -> Result<()> {
        let (key, parent_path) = path
            .split_last()
            .ok_or_else(|| StoreError::InvalidPath("cannot unregister the root module".into()))?;
        let parent = self.get_mut(parent_path)?;
        match parent.get_child(key) {
            None => Err(StoreError::ModuleNotFound(display_path(path))),
            Some(child) if !child.runtime => Err(StoreError::StaticModule(display_path(path))),
            Some(_) => {
                parent.remove_child(key);
                Ok(())
            }
        }
    }
}

fn update_node(path: &mut Vec<String>, target: &mut ModuleNode, config: &ModuleConfig) -> Result<()> {
    validate_config(path, config)?;
    target.update(config);

    for (key, child_config) in &config.modules {
        if !target.has_child(key) {
            warn!(
                module = %key,
                at = %display_path(path),
                "cannot add a new module via hot update; a full rebuild is required"
            );
            return Ok(());
        }
        path.push(key.clone());
        let child = target.get_child_mut(key).expect("child checked above");
        update_node(path, child, child_config)?;
        path.pop();
    }
    Ok(())
}

/// Reject descriptors the type system cannot rule out: empty entry names,
/// the namespace separator inside a name (it would corrupt qualified keys),
/// duplicate names within one map, and a non-object literal state on a
/// module with children (nothing to graft the children into).
fn validate_config(path: &[String], config: &ModuleConfig) -> Result<()> {
    let kinds: [(&str, Vec<&String>); 4] = [
        ("getters", config.getters.iter().map(|(k, _)| k).collect()),
        ("mutations", config.mutations.iter().map(|(k, _)| k).collect()),
        ("actions", config.actions.iter().map(|(k, _)| k).collect()),
        ("modules", config.modules.iter().map(|(k, _)| k).collect()),
    ];

    for (kind, keys) in &kinds {
        let mut seen = HashSet::new();
        for key in keys {
            let invalid = |reason: &str| StoreError::InvalidConfig {
                path: display_path(path),
                key: format!("{kind}.{key}"),
                reason: reason.to_string(),
            };
            if key.is_empty() {
                return Err(invalid("entry name must not be empty"));
            }
            if key.contains('/') {
                return Err(invalid("entry name must not contain '/'"));
            }
            if !seen.insert(key.as_str()) {
                return Err(invalid("duplicate entry name"));
            }
        }
    }

    if !config.modules.is_empty() {
        if let Some(crate::config::StateInit::Value(v)) = &config.state {
            if !v.is_object() {
                return Err(StoreError::InvalidConfig {
                    path: display_path(path),
                    key: "state".to_string(),
                    reason: "state must be an object when nested modules are declared".to_string(),
                });
            }
        }
    }
    Ok(())
}
