//! Developer configuration surface: the recursive module descriptor.

use crate::context::{ActionContext, GetterContext};
use crate::error::Result;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;

/// A synchronous state-transition handler. Receives the module's local state
/// slice and the commit payload. An `Err` aborts the remaining handlers
/// registered for the same commit and propagates to the caller.
pub type MutationFn = Arc<dyn Fn(&mut Value, Option<&Value>) -> Result<()> + Send + Sync>;

/// A derived-value function. Pure: reads local/root state and other getters
/// through the context, returns a value.
pub type GetterFn = Arc<dyn Fn(&GetterContext) -> Value + Send + Sync>;

/// An orchestration handler. Receives a module-scoped context and the
/// dispatch payload, returns a boxed future.
pub type ActionFn =
    Arc<dyn Fn(ActionContext, Option<Value>) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Initial state for a module: a literal value or a factory producing a
/// fresh value per registration.
#[derive(Clone)]
pub enum StateInit {
    Value(Value),
    Factory(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl StateInit {
    pub(crate) fn materialize(&self) -> Value {
        match self {
            StateInit::Value(v) => v.clone(),
            StateInit::Factory(f) => f(),
        }
    }
}

/// An action declaration: the handler plus whether it registers under its
/// unprefixed key regardless of the module's namespace.
#[derive(Clone)]
pub struct Action {
    pub(crate) handler: ActionFn,
    pub(crate) root: bool,
}

impl Action {
    /// Declare an action registered under its namespaced key.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(ActionContext, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            handler: Arc::new(move |ctx, payload| Box::pin(f(ctx, payload))),
            root: false,
        }
    }

    /// Declare an action registered under its unprefixed key even inside a
    /// namespaced module.
    pub fn root<F, Fut>(f: F) -> Self
    where
        F: Fn(ActionContext, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            root: true,
            ..Self::new(f)
        }
    }
}

/// Recursive module descriptor.
///
/// A module contributes a state slice, getters, mutations, and actions, and
/// may declare nested modules. Entry order is preserved: handlers sharing a
/// global key across modules run in registration order.
#[derive(Clone, Default)]
pub struct ModuleConfig {
    pub(crate) namespaced: bool,
    pub(crate) state: Option<StateInit>,
    pub(crate) getters: Vec<(String, GetterFn)>,
    pub(crate) mutations: Vec<(String, MutationFn)>,
    pub(crate) actions: Vec<(String, Action)>,
    pub(crate) modules: Vec<(String, ModuleConfig)>,
}

impl ModuleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Isolate this module's registered keys behind its path-derived prefix.
    pub fn namespaced(mut self, yes: bool) -> Self {
        self.namespaced = yes;
        self
    }

    /// Literal initial state for this module.
    pub fn state(mut self, value: Value) -> Self {
        self.state = Some(StateInit::Value(value));
        self
    }

    /// State factory, evaluated once per registration.
    pub fn state_with<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.state = Some(StateInit::Factory(Arc::new(f)));
        self
    }

    pub fn mutation<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Value, Option<&Value>) -> Result<()> + Send + Sync + 'static,
    {
        self.mutations.push((name.into(), Arc::new(f)));
        self
    }

    pub fn getter<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&GetterContext) -> Value + Send + Sync + 'static,
    {
        self.getters.push((name.into(), Arc::new(f)));
        self
    }

    pub fn action<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(ActionContext, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.actions.push((name.into(), Action::new(f)));
        self
    }

    /// Register a pre-built action declaration (e.g. [`Action::root`]).
    pub fn action_decl(mut self, name: impl Into<String>, action: Action) -> Self {
        self.actions.push((name.into(), action));
        self
    }

    /// Declare a nested module.
    pub fn module(mut self, name: impl Into<String>, config: ModuleConfig) -> Self {
        self.modules.push((name.into(), config));
        self
    }

    /// Initial state slice for a node built from this config. Modules with no
    /// declared state contribute an empty object so children can graft into
    /// it.
    pub(crate) fn initial_state(&self) -> Value {
        self.state
            .as_ref()
            .map(StateInit::materialize)
            .unwrap_or_else(|| Value::Object(Map::new()))
    }
}
