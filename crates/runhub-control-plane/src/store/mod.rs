//! Storage boundaries for Runs and Tasks.

pub mod memory;
pub mod task;

pub use memory::InMemoryRunStore;
pub use task::{InMemoryTaskStore, TaskStore};

use async_trait::async_trait;
use thiserror::Error;

use runhub_core::{Page, PageRequest, Run, RunId, RunStatus};

/// Error type for storage operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Durable keyed storage for Runs.
///
/// Every operation is atomic for a single record.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert or replace the run with the same id; returns the stored record.
    async fn save(&self, run: Run) -> Result<Run, StoreError>;

    /// Store `run` only if no run with its id exists. Returns false if the
    /// id is already taken.
    async fn insert(&self, run: Run) -> Result<bool, StoreError>;

    /// Replace the stored run only while it still equals `expected`.
    /// Returns false if the run changed or no longer exists.
    async fn replace(&self, expected: &Run, run: Run) -> Result<bool, StoreError>;

    async fn find_by_id(&self, id: &RunId) -> Result<Option<Run>, StoreError>;

    /// One page of runs. Unless the request asks for a sort, runs come back
    /// in insertion order.
    async fn find_all(&self, request: PageRequest) -> Result<Page<Run>, StoreError>;

    /// Remove a run. Returns false if it did not exist.
    async fn delete_by_id(&self, id: &RunId) -> Result<bool, StoreError>;

    /// Compare-and-set on status: moves the run from `from` to `to` only if
    /// its current status is `from`.
    ///
    /// Returns the updated run, or `None` if the run is missing or its
    /// status no longer matches.
    async fn transition(
        &self,
        id: &RunId,
        from: RunStatus,
        to: RunStatus,
    ) -> Result<Option<Run>, StoreError>;
}
