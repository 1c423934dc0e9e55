use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::Json;
use serde_json::Value;

use crate::{error::ApiError, state::AppState};

/// GET /scram/input/{inputId}
/// The request document a job was queued with. Input ids are job ids.
pub async fn get_input(
    Extension(state): Extension<Arc<AppState>>,
    Path(input_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let bytes = state.store.get_input(&input_id).await?;
    let input = serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::unexpected(format!("stored input of {input_id} is not JSON: {e}")))?;
    Ok(Json(input))
}
