//! Quantification job executors for the RAPTOR worker pool.
//!
//! This crate provides implementations of the [`JobExecutor`](raptor_job_queue::JobExecutor)
//! trait backed by an external quantification engine.
//!
//! # Job Types
//!
//! - `scram.quantify` - Quantify a model once
//! - `scram.quantify.adaptive` - Quantify with adaptively widened truncation
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use raptor_job_queue::{AdaptiveParams, StatusStore, WorkerPool};
//! use raptor_jobs::{register_all_executors, ProcessEngine};
//!
//! #[tokio::main]
//! async fn main() {
//!     let pool = WorkerPool::new(StatusStore::in_memory());
//!     let engine = Arc::new(ProcessEngine::new("scram-engine", Vec::new()));
//!     register_all_executors(&pool, engine, AdaptiveParams::default()).await;
//! }
//! ```

mod adaptive;
mod engine;
mod error;
mod quantify;

pub use adaptive::{relative_error, run_adaptive, AdaptiveOutcome};
pub use engine::{EngineRun, ProcessEngine, QuantEngine};
pub use error::JobError;
pub use quantify::{AdaptiveQuantifyExecutor, QuantifyExecutor};
pub use raptor_job_queue::job_types;

use std::sync::Arc;

use raptor_job_queue::{AdaptiveParams, WorkerPool};

/// Register all available job executors with the worker pool.
pub async fn register_all_executors(
    pool: &WorkerPool,
    engine: Arc<dyn QuantEngine>,
    adaptive_defaults: AdaptiveParams,
) {
    let store = pool.store().clone();
    pool.register_executor(QuantifyExecutor::new(store.clone(), engine.clone()))
        .await;
    pool.register_executor(AdaptiveQuantifyExecutor::new(
        store,
        engine,
        adaptive_defaults,
    ))
    .await;
}
