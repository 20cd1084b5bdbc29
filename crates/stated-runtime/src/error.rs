//! Error types for the runtime crate.

use stated_models::{ParseExpireActionError, ParseVariableTypeError};
use stated_persistence::PersistenceError;
use thiserror::Error;

/// Errors that can occur in the runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Rejected before any mutation (bad TTL, type, prefix or name).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Variable not found.
    #[error("variable not found: {0}")]
    NotFound(String),

    /// Storage error.
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Runtime already started.
    #[error("runtime already started")]
    AlreadyStarted,

    /// Runtime not started.
    #[error("runtime not started")]
    NotStarted,

    /// Shutdown error.
    #[error("shutdown error: {0}")]
    Shutdown(String),
}

impl From<ParseVariableTypeError> for RuntimeError {
    fn from(e: ParseVariableTypeError) -> Self {
        RuntimeError::InvalidArgument(e.to_string())
    }
}

impl From<ParseExpireActionError> for RuntimeError {
    fn from(e: ParseExpireActionError) -> Self {
        RuntimeError::InvalidArgument(e.to_string())
    }
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
