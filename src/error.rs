//! Error types for the state container.

use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("module not found: {0}")]
    ModuleNotFound(String),

    #[error("invalid module config at '{path}', entry '{key}': {reason}")]
    InvalidConfig {
        path: String,
        key: String,
        reason: String,
    },

    #[error("cannot unregister static module: {0}")]
    StaticModule(String),

    #[error("invalid module path: {0}")]
    InvalidPath(String),

    #[error("invalid state shape: {0}")]
    InvalidState(String),

    #[error("handler error: {0}")]
    Handler(String),
}

impl StoreError {
    /// Shorthand for application-level failures inside mutation or action
    /// handlers.
    pub fn handler(msg: impl Into<String>) -> Self {
        StoreError::Handler(msg.into())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
