//! Crate-level error type

use crate::context::{BudgetError, Role};
use crate::storage::StorageError;
use thiserror::Error;

/// Errors surfaced to callers of the context engine
#[derive(Debug, Error)]
pub enum ContextError {
    /// Message retrieval or conversation lookup failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Budget error: {0}")]
    Budget(#[from] BudgetError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Transcript turns may only be user or assistant messages
    #[error("Role '{0}' is reserved and cannot be recorded in the transcript")]
    InvalidRole(Role),
}

impl From<::config::ConfigError> for ContextError {
    fn from(err: ::config::ConfigError) -> Self {
        ContextError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ContextError>;
