//! Module error types and result aliases.

use thiserror::Error;

/// Result type alias for module operations.
pub type ModuleResult<T> = Result<T, ModuleError>;

/// Errors that can occur during module lifecycle operations.
#[derive(Debug, Clone, Error)]
pub enum ModuleError {
    /// Configuration could not be parsed or failed validation.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Module is in the wrong state for the requested operation.
    #[error("invalid state: current={current}, expected={expected}")]
    InvalidState {
        /// Current state of the module.
        current: String,
        /// State required by the operation.
        expected: String,
    },

    /// Module could not start (bind failure, missing runtime, ...).
    #[error("start failed: {0}")]
    StartFailed(String),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ModuleError {
    /// Shorthand for an [`ModuleError::InvalidState`] error.
    pub fn invalid_state(current: impl ToString, expected: impl Into<String>) -> Self {
        Self::InvalidState {
            current: current.to_string(),
            expected: expected.into(),
        }
    }
}
