use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::Json;
use raptor_job_queue::AggregatedOutput;

use crate::{error::ApiError, state::AppState};

/// GET /scram/output/{jobId}
/// A job's result, or every sequence's result for a batch.
pub async fn get_output(
    Extension(state): Extension<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<AggregatedOutput>, ApiError> {
    Ok(Json(state.store.get_output(&job_id).await?))
}
