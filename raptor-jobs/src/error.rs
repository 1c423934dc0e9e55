//! Job execution errors.

use raptor_job_queue::JobQueueError;
use thiserror::Error;

/// Errors that may occur during job execution.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("quantification engine failed: {0}")]
    Engine(String),

    #[error("unreadable engine output: {0}")]
    InvalidEngineOutput(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Queue(#[from] JobQueueError),
}

impl From<JobError> for JobQueueError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Queue(inner) => inner,
            other => JobQueueError::ExecutionFailed(other.to_string()),
        }
    }
}
