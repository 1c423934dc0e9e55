use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::Json;
use raptor_job_queue::JobStatus;
use serde_json::{json, Value};

use crate::{error::ApiError, state::AppState};

/// GET /jobs/{state}
/// Jobs currently in `state` (queued, processing, completed, partial, failed).
/// Matching is case-insensitive and `running` is accepted for processing.
pub async fn list_by_state(
    Extension(state): Extension<Arc<AppState>>,
    Path(job_state): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let status: JobStatus = job_state
        .parse()
        .map_err(ApiError::bad_request)?;

    let jobs: Vec<Value> = state
        .store
        .list_by_status(status)
        .await
        .into_iter()
        .map(|record| {
            json!({
                "jobId": record.job_id,
                "parentId": record.parent_id,
                "status": record.status.to_string(),
                "adaptive": record.adaptive,
            })
        })
        .collect();

    Ok(Json(json!({ "jobs": jobs })))
}
