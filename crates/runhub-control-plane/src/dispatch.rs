//! Dispatch channel: tells executors that a persisted run is ready.
//!
//! Publishing is fire-and-forget. Delivery is at-least-once from the
//! executor's point of view, so consumers must tolerate duplicates.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use runhub_core::{Kind, Run, RunId, SpecDocument, TaskId};

/// Dispatch errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Dispatch channel closed")]
    Closed,

    #[error("Dispatch channel full")]
    Full,
}

/// "Run is ready for execution" message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchMessage {
    pub run_id: RunId,
    pub task_id: TaskId,
    pub kind: Kind,
    /// Spec exactly as persisted.
    pub spec: SpecDocument,
}

impl From<&Run> for DispatchMessage {
    fn from(run: &Run) -> Self {
        Self {
            run_id: run.id.clone(),
            task_id: run.task_id.clone(),
            kind: run.task_kind.clone(),
            spec: run.spec.clone(),
        }
    }
}

/// Publishing side of the dispatch channel.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn publish(&self, message: DispatchMessage) -> Result<(), DispatchError>;
}

/// Dispatcher over a bounded in-process `mpsc` queue.
#[derive(Clone)]
pub struct ChannelDispatcher {
    tx: mpsc::Sender<DispatchMessage>,
}

/// Executor side of a [`ChannelDispatcher`].
pub struct DispatchReceiver {
    rx: mpsc::Receiver<DispatchMessage>,
}

/// Create a bounded dispatch channel.
pub fn channel(capacity: usize) -> (ChannelDispatcher, DispatchReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ChannelDispatcher { tx }, DispatchReceiver { rx })
}

#[async_trait]
impl Dispatcher for ChannelDispatcher {
    async fn publish(&self, message: DispatchMessage) -> Result<(), DispatchError> {
        // Never wait on the executor.
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::Full,
            mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
        })
    }
}

impl DispatchReceiver {
    /// Wait for the next message. `None` once every dispatcher is dropped.
    pub async fn recv(&mut self) -> Option<DispatchMessage> {
        self.rx.recv().await
    }

    /// Take a message if one is queued.
    pub fn try_recv(&mut self) -> Option<DispatchMessage> {
        self.rx.try_recv().ok()
    }
}
