use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::Json;
use raptor_job_queue::JobStatsView;

use crate::{error::ApiError, state::AppState};

/// GET /scram/stats/{id}
pub async fn get_stats(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobStatsView>, ApiError> {
    Ok(Json(state.stats.get_job_stats(&id).await?))
}
