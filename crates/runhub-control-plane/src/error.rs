//! Errors surfaced to callers of the run service.

use thiserror::Error;

use runhub_core::{RunId, RunStatus, TaskId};

/// Run service errors.
///
/// Configuration defects (unknown or malformed kinds, missing mandatory
/// validators) and storage failures all surface as [`ServiceError::Internal`]
/// with a generic message; the details go to the log.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Run not found: {0}")]
    RunNotFound(RunId),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: RunStatus, to: RunStatus },

    #[error("Problem while saving the run: {0}")]
    RunSaveError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// True for errors the caller can fix by changing its input.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::TaskNotFound(_)
                | Self::RunNotFound(_)
                | Self::ValidationFailed(_)
                | Self::InvalidTransition { .. }
        )
    }

    pub(crate) fn internal() -> Self {
        Self::Internal("the request could not be processed".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_errors_are_classified() {
        assert!(ServiceError::TaskNotFound(TaskId::new("t")).is_user_error());
        assert!(ServiceError::ValidationFailed("x".into()).is_user_error());
        assert!(!ServiceError::internal().is_user_error());
        assert!(!ServiceError::RunSaveError("x".into()).is_user_error());
    }
}
