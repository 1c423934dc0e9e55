use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::Json;
use raptor_job_queue::{JobReport, JobStatus, JobStatusRecord};

use crate::{error::ApiError, state::AppState};

/// PUT /scram/report/{jobId}
/// Report path for workers running outside this process.
pub async fn put_report(
    Extension(state): Extension<Arc<AppState>>,
    Path(job_id): Path<String>,
    Json(report): Json<JobReport>,
) -> Result<Json<JobStatusRecord>, ApiError> {
    if report.status == JobStatus::Processing {
        // Pickup: an already finished job stays as it is.
        state.store.mark_processing(&job_id).await?;
        return Ok(Json(state.store.get_status(&job_id).await?));
    }
    if !report.status.is_terminal() {
        return Err(ApiError::bad_request(format!(
            "workers cannot report status {}",
            report.status
        )));
    }

    Ok(Json(state.store.record_report(&job_id, report).await?))
}
