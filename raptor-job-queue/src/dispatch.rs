//! Dispatch channel carrying work items from the producer to workers.
//!
//! The channel only promises at-least-once delivery with no ordering between
//! jobs; workers must tolerate duplicates.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

use crate::types::WorkItem;

/// Errors raised when publishing a work item.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatch channel is closed")]
    Closed,

    #[error("dispatch channel is full")]
    Full,

    #[error("dispatch rejected: {0}")]
    Rejected(String),
}

/// Publishing side of the message broker.
#[async_trait]
pub trait DispatchChannel: Send + Sync {
    async fn publish(&self, item: WorkItem) -> Result<(), DispatchError>;
}

/// Bounded in-process channel standing in for the broker.
#[derive(Debug, Clone)]
pub struct InMemoryDispatch {
    sender: mpsc::Sender<WorkItem>,
}

impl InMemoryDispatch {
    /// Create a channel that holds at most `capacity` undelivered items.
    pub fn new(capacity: usize) -> (Self, WorkReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self { sender },
            WorkReceiver {
                inner: Arc::new(Mutex::new(receiver)),
            },
        )
    }
}

#[async_trait]
impl DispatchChannel for InMemoryDispatch {
    async fn publish(&self, item: WorkItem) -> Result<(), DispatchError> {
        self.sender.try_send(item).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::Full,
            mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
        })
    }
}

/// Consuming side of [`InMemoryDispatch`], shareable between workers.
#[derive(Debug, Clone)]
pub struct WorkReceiver {
    inner: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
}

impl WorkReceiver {
    /// Wait for the next work item; `None` once every publisher is gone.
    pub async fn recv(&self) -> Option<WorkItem> {
        let mut receiver = self.inner.lock().await;
        receiver.recv().await
    }

    /// Take the next work item if one is already waiting.
    pub async fn try_recv(&self) -> Option<WorkItem> {
        let mut receiver = self.inner.lock().await;
        receiver.try_recv().ok()
    }
}
