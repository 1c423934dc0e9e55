use std::sync::Arc;

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use raptor_job_queue::JobQueueError;

use crate::{error::ApiError, state::AppState};

/// POST /scram/claim
/// Hand the next queued work item to an external worker and mark it
/// PROCESSING. Responds 204 when nothing is waiting.
pub async fn claim_work(Extension(state): Extension<Arc<AppState>>) -> Result<Response, ApiError> {
    let receiver = state
        .work_receiver
        .as_ref()
        .ok_or_else(|| ApiError::not_found("work items are consumed by in-process workers"))?;

    while let Some(item) = receiver.try_recv().await {
        match state.store.mark_processing(&item.job_id).await {
            Ok(Some(_)) => {
                tracing::debug!(job_id = %item.job_id, "work item claimed");
                return Ok(Json(item).into_response());
            }
            // Redelivered after it finished, or its record is gone.
            Ok(None) | Err(JobQueueError::NotFound(_)) => continue,
            Err(err) => return Err(err.into()),
        }
    }

    Ok(StatusCode::NO_CONTENT.into_response())
}
