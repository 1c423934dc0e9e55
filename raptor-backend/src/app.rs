use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit, extract::Extension, response::IntoResponse, routing::get,
    routing::post, routing::put, Router,
};
use tower_http::trace::TraceLayer;

use crate::handlers::{jobs, scram};
use crate::state::AppState;

/// Default body limit: 50 MB (PRA models with many event trees get large)
pub const DEFAULT_BODY_LIMIT: usize = 50 * 1024 * 1024;

/// Build the primary axum router with the provided shared application state.
pub fn build_router(state: Arc<AppState>, body_limit: usize) -> Router {
    let router = Router::new()
        .route("/scram", post(scram::create::create).get(scram::list::list_completed))
        .route("/scram/adaptive", post(scram::adaptive::create_adaptive))
        .route("/scram/{jobId}", get(scram::status::get_status))
        .route("/scram/input/{inputId}", get(scram::input::get_input))
        .route("/scram/output/{jobId}", get(scram::output::get_output))
        .route("/scram/stats/{id}", get(scram::stats::get_stats))
        .route("/scram/claim", post(scram::claim::claim_work))
        .route("/scram/report/{jobId}", put(scram::report::put_report))
        .route("/jobs/types", get(jobs::types::list_types))
        .route("/jobs/{state}", get(jobs::list::list_by_state));

    // health and readiness endpoints
    let router = router
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler));

    let router = router
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(Extension(state));

    Router::new().nest("/api", router)
}

async fn health_handler() -> impl IntoResponse {
    // Liveness: always return 200 OK when process is alive.
    (axum::http::StatusCode::OK, "OK")
}

async fn ready_handler(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    // A pool that is configured but has no executors would accept jobs it
    // can never finish.
    match &state.worker_pool {
        Some(pool) if pool.job_types().await.is_empty() => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            "no executors registered",
        ),
        _ => (axum::http::StatusCode::OK, "OK"),
    }
}
