use axum::{http::StatusCode, response::IntoResponse, Json};
use raptor_job_queue::JobQueueError;
use serde_json::json;
use thiserror::Error;

type SerdeJsonError = serde_json::Error;

/// Top-level API error shared by all route handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    JobQueue(#[from] JobQueueError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    SerdeJson(#[from] SerdeJsonError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::JobQueue(err) => match err {
                JobQueueError::NotFound(_) => StatusCode::NOT_FOUND,
                JobQueueError::DecompositionEmpty => StatusCode::UNPROCESSABLE_ENTITY,
                JobQueueError::PartialBatchFailure { .. } => StatusCode::BAD_GATEWAY,
                JobQueueError::PersistFailure { .. } | JobQueueError::PublishFailure { .. } => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                JobQueueError::InvalidReport { .. } => StatusCode::BAD_REQUEST,
                JobQueueError::ExecutionFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::SerdeJson(_) => StatusCode::BAD_REQUEST,
            ApiError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();

        // Callers need the queued siblings to clean up a half-dispatched batch.
        let payload = match &self {
            ApiError::JobQueue(JobQueueError::PartialBatchFailure {
                root_id,
                failed_index,
                enqueued,
                ..
            }) => json!({
                "error": self.to_string(),
                "parentJobId": root_id,
                "failedIndex": failed_index,
                "enqueuedJobIds": enqueued,
            }),
            _ => json!({ "error": self.to_string() }),
        };

        if status.is_server_error() {
            tracing::warn!(%status, error = %self, "request failed");
        }

        (status, Json(payload)).into_response()
    }
}
