//! In-process worker pool consuming the dispatch channel.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::dispatch::WorkReceiver;
use crate::error::JobQueueError;
use crate::executor::JobExecutor;
use crate::store::StatusStore;
use crate::types::{JobReport, JobStatus, WorkItem};

/// Runs work items through the executor registered for their job type.
#[derive(Clone)]
pub struct WorkerPool {
    store: StatusStore,
    executors: Arc<RwLock<HashMap<String, Arc<dyn JobExecutor>>>>,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("store", &self.store)
            .field(
                "executors",
                &"<RwLock<HashMap<String, Arc<dyn JobExecutor>>>>",
            )
            .finish()
    }
}

impl WorkerPool {
    pub fn new(store: StatusStore) -> Self {
        Self {
            store,
            executors: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &StatusStore {
        &self.store
    }

    /// Register a job executor for a specific job type.
    pub async fn register_executor<E: JobExecutor + 'static>(&self, executor: E) {
        let job_type = executor.job_type().to_owned();
        let mut executors = self.executors.write().await;
        executors.insert(job_type, Arc::new(executor));
    }

    /// Job types with a registered executor, sorted.
    pub async fn job_types(&self) -> Vec<String> {
        let executors = self.executors.read().await;
        let mut types: Vec<String> = executors.keys().cloned().collect();
        types.sort();
        types
    }

    /// Process one work item to completion and return the job's final status.
    ///
    /// Items for jobs that already finished are skipped, so redelivery by the
    /// broker is harmless.
    pub async fn process(&self, item: WorkItem) -> Result<JobStatus, JobQueueError> {
        let job_id = item.job_id.clone();
        let Some(record) = self.store.mark_processing(&job_id).await? else {
            debug!(%job_id, "skipping redelivered job that already finished");
            return Ok(self.store.get_record(&job_id).await?.status);
        };

        let executor = {
            let executors = self.executors.read().await;
            executors.get(&item.job_type).cloned()
        };

        let outcome = match executor {
            Some(executor) => executor.execute(item).await,
            None => Err(JobQueueError::ExecutionFailed(format!(
                "no executor registered for job type {}",
                record.job_type
            ))),
        };

        if let Err(err) = outcome {
            warn!(%job_id, error = %err, "job execution failed");
            self.store
                .record_report(&job_id, JobReport::failed(err.to_string()))
                .await?;
        }

        Ok(self.store.get_record(&job_id).await?.status)
    }

    /// Spawn `concurrency` workers pulling from `receiver` until it closes.
    pub fn spawn(&self, receiver: WorkReceiver, concurrency: usize) -> Vec<JoinHandle<()>> {
        (0..concurrency.max(1))
            .map(|worker| {
                let pool = self.clone();
                let receiver = receiver.clone();
                tokio::spawn(async move {
                    info!(worker, "quantification worker started");
                    while let Some(item) = receiver.recv().await {
                        let job_id = item.job_id.clone();
                        match pool.process(item).await {
                            Ok(status) => debug!(worker, %job_id, %status, "work item processed"),
                            Err(err) => error!(worker, %job_id, error = %err, "work item could not be processed"),
                        }
                    }
                    info!(worker, "quantification worker stopped");
                })
            })
            .collect()
    }
}
