//! Job executor trait for implementing job handlers.

use async_trait::async_trait;

use crate::error::JobQueueError;
use crate::types::WorkItem;

/// Trait for implementing job executors.
///
/// Job executors run on workers. Each job type has a corresponding executor
/// implementation, which is expected to record its own outcome through
/// [`StatusStore::record_report`](crate::StatusStore::record_report) when it
/// succeeds.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Returns the job type this executor handles.
    fn job_type(&self) -> &str;

    /// Execute the job described by `item`.
    ///
    /// An error marks the job FAILED with the error's message.
    async fn execute(&self, item: WorkItem) -> Result<(), JobQueueError>;
}
