//! Error types for the job queue system.

use thiserror::Error;

use crate::artifact::ArtifactError;
use crate::dispatch::DispatchError;

/// Errors that may occur while decomposing, dispatching or tracking jobs.
#[derive(Debug, Error)]
pub enum JobQueueError {
    #[error("request decomposed into zero sequences; nothing to quantify")]
    DecompositionEmpty,

    #[error("failed to persist job {job_id}: {reason}")]
    PersistFailure { job_id: String, reason: String },

    #[error("failed to publish job {job_id}: {reason}")]
    PublishFailure { job_id: String, reason: String },

    #[error("job not found: {0}")]
    NotFound(String),

    #[error(
        "batch {root_id} stopped at sequence {failed_index} with {} sequence job(s) already queued",
        .enqueued.len()
    )]
    PartialBatchFailure {
        root_id: String,
        failed_index: usize,
        enqueued: Vec<String>,
        #[source]
        source: Box<JobQueueError>,
    },

    #[error("invalid report for job {job_id}: {reason}")]
    InvalidReport { job_id: String, reason: String },

    #[error("job execution failed: {0}")]
    ExecutionFailed(String),
}

impl JobQueueError {
    pub(crate) fn persist(job_id: &str, err: ArtifactError) -> Self {
        match err {
            ArtifactError::NotFound(_) => Self::NotFound(job_id.to_owned()),
            other => Self::PersistFailure {
                job_id: job_id.to_owned(),
                reason: other.to_string(),
            },
        }
    }

    pub(crate) fn publish(job_id: &str, err: DispatchError) -> Self {
        Self::PublishFailure {
            job_id: job_id.to_owned(),
            reason: err.to_string(),
        }
    }

    /// True when the error means no work at all reached the dispatch channel.
    pub fn nothing_queued(&self) -> bool {
        !matches!(self, Self::PartialBatchFailure { .. })
    }
}
