use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::Json;
use raptor_job_queue::JobStatusRecord;

use crate::{error::ApiError, state::AppState};

/// GET /scram/{jobId}
pub async fn get_status(
    Extension(state): Extension<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusRecord>, ApiError> {
    Ok(Json(state.store.get_status(&job_id).await?))
}
