//! # Treestate
//!
//! A hierarchical state container: a single state tree assembled from nested
//! modules, changed only through committed mutations, queried through
//! memoized getters, and orchestrated through async actions.
//!
//! ## Core Concepts
//!
//! - **Modules**: Recursive configs contributing state, getters, mutations,
//!   and actions; namespaced modules isolate their keys behind a path prefix
//! - **Mutations**: Synchronous, committed state transitions
//! - **Actions**: Async orchestration with a module-scoped context
//! - **Getters**: Derived values memoized per state version
//! - **Dynamic modules**: Register and unregister whole subtrees at run time
//!
//! ## Example
//!
//! ```ignore
//! use treestate::{ModuleConfig, Store};
//! use serde_json::json;
//!
//! let store = Store::new(
//!     ModuleConfig::new()
//!         .state(json!({"count": 0}))
//!         .mutation("increment", |state, _| {
//!             state["count"] = json!(state["count"].as_i64().unwrap() + 1);
//!             Ok(())
//!         })
//!         .getter("double", |g| json!(g.state()["count"].as_i64().unwrap() * 2)),
//! )?;
//!
//! store.commit("increment")?;
//! assert_eq!(store.getter("double"), Some(json!(2)));
//! ```

pub mod config;
pub mod context;
pub mod error;
mod install;
mod module;
pub mod reactive;
pub mod store;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use config::{Action, ActionFn, GetterFn, ModuleConfig, MutationFn, StateInit};
pub use context::{ActionContext, GetterContext, LocalContext, LocalGetters};
pub use error::{Result, StoreError};
pub use reactive::WatchHandle;
pub use store::{Diagnostics, Getters, RegisterOptions, Store, StoreBuilder};
pub use subscriptions::{
    ActionSubscriber, EventStream, StoreEvent, SubscriptionHandle,
};
pub use types::{ActionRecord, ActionRequest, CallOptions, MutationRecord, MutationRequest};
