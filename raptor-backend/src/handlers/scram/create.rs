use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Extension, Query};
use axum::Json;
use serde_json::{json, Value};

use crate::handlers::utils::{batch_payload, distributed_sequences};
use crate::{error::ApiError, state::AppState};

/// POST /scram
/// Queue a quantification, optionally split into one job per sequence.
pub async fn create(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    Json(request): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    if distributed_sequences(&params) {
        let ids = state
            .producer
            .create_and_queue_sequence_batch(&request)
            .await?;
        return Ok(Json(batch_payload(&ids)?));
    }

    let job_id = state.producer.create_and_queue_quant(&request).await?;
    Ok(Json(json!({ "jobId": job_id })))
}
