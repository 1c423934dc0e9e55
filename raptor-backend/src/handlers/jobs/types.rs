use axum::Json;
use serde_json::{json, Value};

use raptor_jobs::job_types;

/// GET /jobs/types
/// Quantification services this deployment accepts.
pub async fn list_types() -> Json<Value> {
    Json(json!({
        "services": [
            { "name": job_types::QUANTIFY, "endpoint": "/api/scram" },
            { "name": job_types::QUANTIFY_ADAPTIVE, "endpoint": "/api/scram/adaptive" },
        ]
    }))
}
