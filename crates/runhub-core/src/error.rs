//! Core domain errors.

use thiserror::Error;

use crate::RunStatus;

/// Core domain errors for RunHub.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Kind token is not of the form `<runtime>:<task>`.
    #[error("Malformed kind: '{0}'")]
    MalformedKind(String),

    /// Invalid run status transition.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: RunStatus, to: RunStatus },

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}
