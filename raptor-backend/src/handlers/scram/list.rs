use std::sync::Arc;

use axum::extract::Extension;
use axum::Json;

use crate::{error::ApiError, state::AppState};

/// GET /scram
/// Ids of every completed job.
pub async fn list_completed(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.store.list_completed_job_ids().await))
}
