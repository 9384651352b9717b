//! Core types shared across the store.

use serde::Serialize;
use serde_json::Value;

/// A normalized commit request: a mutation type plus an optional payload.
///
/// `From` conversions cover the two call styles: a bare type string
/// (`store.commit("increment")`) and a `(type, payload)` pair
/// (`store.commit(("add", json!(5)))`). A fully built request can be passed
/// as-is.
#[derive(Clone, Debug)]
pub struct MutationRequest {
    pub kind: String,
    pub payload: Option<Value>,
}

impl MutationRequest {
    pub fn new(kind: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

impl From<&str> for MutationRequest {
    fn from(kind: &str) -> Self {
        Self::new(kind, None)
    }
}

impl From<String> for MutationRequest {
    fn from(kind: String) -> Self {
        Self::new(kind, None)
    }
}

impl From<(&str, Value)> for MutationRequest {
    fn from((kind, payload): (&str, Value)) -> Self {
        Self::new(kind, Some(payload))
    }
}

impl From<(String, Value)> for MutationRequest {
    fn from((kind, payload): (String, Value)) -> Self {
        Self::new(kind, Some(payload))
    }
}

/// A normalized dispatch request: an action type plus an optional payload.
#[derive(Clone, Debug)]
pub struct ActionRequest {
    pub kind: String,
    pub payload: Option<Value>,
}

impl ActionRequest {
    pub fn new(kind: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

impl From<&str> for ActionRequest {
    fn from(kind: &str) -> Self {
        Self::new(kind, None)
    }
}

impl From<String> for ActionRequest {
    fn from(kind: String) -> Self {
        Self::new(kind, None)
    }
}

impl From<(&str, Value)> for ActionRequest {
    fn from((kind, payload): (&str, Value)) -> Self {
        Self::new(kind, Some(payload))
    }
}

impl From<(String, Value)> for ActionRequest {
    fn from((kind, payload): (String, Value)) -> Self {
        Self::new(kind, Some(payload))
    }
}

/// Options for dispatch/commit calls made through a module-local context.
///
/// `root: true` bypasses namespace prefixing and targets the global registry
/// directly.
#[derive(Clone, Copy, Debug, Default)]
pub struct CallOptions {
    pub root: bool,
}

impl CallOptions {
    pub fn root() -> Self {
        Self { root: true }
    }
}

/// A committed mutation as seen by subscribers.
#[derive(Clone, Debug, Serialize)]
pub struct MutationRecord {
    pub kind: String,
    pub payload: Option<Value>,
}

/// A dispatched action as seen by action subscribers.
#[derive(Clone, Debug, Serialize)]
pub struct ActionRecord {
    pub kind: String,
    pub payload: Option<Value>,
}

/// Render a module path for diagnostics ("a.b.c"; "<root>" when empty).
pub(crate) fn display_path(path: &[String]) -> String {
    if path.is_empty() {
        "<root>".to_string()
    } else {
        path.join(".")
    }
}

/// Walk a state tree along a module path, one key per segment.
pub(crate) fn resolve<'a>(state: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut current = state;
    for key in path {
        current = current.get(key)?;
    }
    Some(current)
}

/// Mutable variant of [`resolve`].
pub(crate) fn resolve_mut<'a>(state: &'a mut Value, path: &[String]) -> Option<&'a mut Value> {
    let mut current = state;
    for key in path {
        current = current.get_mut(key)?;
    }
    Some(current)
}
