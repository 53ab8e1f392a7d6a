//! Run instances and the caller request that creates them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CoreError, Kind, Metadata, RunId, RunStatus, SpecDocument, TaskId};

/// A concrete, executable instance derived from a Task.
///
/// The spec is fixed once the run is persisted; only `status` (and
/// `updated_at`) change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Unique run identifier.
    pub id: RunId,

    /// Task this run was built from (weak reference).
    pub task_id: TaskId,

    /// Run kind, `<runtime>:run`.
    pub kind: Kind,

    /// Kind of the source task.
    pub task_kind: Kind,

    /// Fully resolved specification: task spec with overrides applied.
    pub spec: SpecDocument,

    pub status: RunStatus,

    #[serde(default)]
    pub metadata: Metadata,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Run {
    /// Move the run to `next`, enforcing the lifecycle.
    pub fn transition(&mut self, next: RunStatus) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Caller request to execute a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunExecRequest {
    pub task_id: TaskId,

    /// Keys merged over the task spec; overrides win.
    #[serde(default)]
    pub spec_overrides: SpecDocument,

    /// Requests sharing a key create a single run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl RunExecRequest {
    /// Create a request with no overrides.
    pub fn new(task_id: impl Into<TaskId>) -> Self {
        Self {
            task_id: task_id.into(),
            spec_overrides: SpecDocument::new(),
            idempotency_key: None,
        }
    }

    /// Builder method to set the spec overrides.
    pub fn with_overrides(mut self, overrides: SpecDocument) -> Self {
        self.spec_overrides = overrides;
        self
    }

    /// Builder method to set an idempotency key.
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}
