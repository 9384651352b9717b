//! Module tree: nodes, hierarchy, namespace resolution.

mod node;
mod tree;

pub(crate) use node::ModuleNode;
pub(crate) use tree::ModuleTree;
