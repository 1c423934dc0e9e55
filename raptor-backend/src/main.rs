//! RAPTOR Backend Server
//!
//! Entry point for the quantification job service: configuration loading,
//! store and dispatch wiring, optional in-process workers, and HTTP startup.

use std::sync::Arc;

use clap::Parser;
use raptor_job_queue::{
    InMemoryDispatch, JsonSequenceExtractor, Producer, ProducerConfig, StatusStore, WorkerPool,
};
use tokio::net::TcpListener;

use raptor_backend::state::AppState;

mod cli;
mod config_helpers;
mod tracing_setup;

use cli::CliArgs;
use config_helpers::{
    adaptive_params_from_config, artifact_store_from_config, engine_from_config,
    parse_bind_address,
};
use tracing_setup::install_tracing_from_config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    eprintln!("[STARTUP] RAPTOR Backend starting...");
    let args = CliArgs::parse();

    // Resolve config path: CLI > environment variable
    let config_path = args
        .config_path
        .or_else(|| std::env::var("RAPTOR_CONFIG_PATH").ok());

    eprintln!("[STARTUP] Loading config from: {:?}", config_path);
    let config = load_config(&config_path)?;
    raptor_config::validate_config(&config).map_err(|e| {
        eprintln!("invalid configuration: {e}");
        anyhow::anyhow!(e.to_string())
    })?;
    eprintln!("[STARTUP] Config loaded successfully");

    eprintln!("[STARTUP] Initializing tracing...");
    let _reload_handle = install_tracing_from_config(&config.logging);
    eprintln!("[STARTUP] Tracing initialized");

    eprintln!("[STARTUP] Initializing stores and dispatch...");
    let store = StatusStore::new(artifact_store_from_config(&config));
    let (dispatch, receiver) = InMemoryDispatch::new(config.dispatch.queue_capacity);
    let adaptive = adaptive_params_from_config(&config);
    let producer = Producer::new(
        store.clone(),
        Arc::new(dispatch),
        Arc::new(JsonSequenceExtractor),
        ProducerConfig {
            fan_out: config.dispatch.fan_out,
            adaptive,
        },
    );
    let mut state = AppState::new(producer);

    tracing::info!(
        fan_out = config.dispatch.fan_out,
        queue_capacity = config.dispatch.queue_capacity,
        storage = config.storage.directory.as_deref().unwrap_or("memory"),
        "dispatch and storage configuration"
    );

    let mut workers = Vec::new();
    if config.worker.enabled {
        eprintln!("[STARTUP] Starting quantification workers...");
        let engine = engine_from_config(&config)
            .ok_or_else(|| anyhow::anyhow!("worker.enabled requires worker.engine_path"))?;
        let pool = WorkerPool::new(store.clone());
        raptor_jobs::register_all_executors(&pool, engine, adaptive).await;
        workers = pool.spawn(receiver, config.worker.concurrency);
        tracing::info!(
            concurrency = config.worker.concurrency,
            job_types = ?pool.job_types().await,
            "quantification workers started"
        );
        state = state.with_worker_pool(pool);
    } else {
        tracing::warn!(
            "in-process workers disabled; external workers claim jobs via POST /api/scram/claim"
        );
        state = state.with_work_receiver(receiver);
    }

    eprintln!("[STARTUP] Building application router...");
    let body_limit = config.server.body_limit_mb * 1024 * 1024;
    let app = raptor_backend::build_router(Arc::new(state), body_limit);
    eprintln!("[STARTUP] Router built successfully");

    eprintln!(
        "[STARTUP] Binding to {}:{}",
        config.server.host, config.server.port
    );
    let addr = parse_bind_address(&config.server.host, config.server.port);
    let listener = TcpListener::bind(addr).await?;
    eprintln!("[STARTUP] ✓ Server listening on {addr}");
    eprintln!("[STARTUP] ✓ Ready to accept connections!");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for worker in workers {
        worker.abort();
    }
    tracing::info!("server stopped");

    Ok(())
}

/// Load configuration from file or defaults.
fn load_config(path: &Option<String>) -> anyhow::Result<raptor_config::Config> {
    match path.as_deref() {
        Some(p) => raptor_config::load_config(Some(p)).map_err(|e| {
            eprintln!("failed to load configuration: {e}");
            anyhow::anyhow!(e.to_string())
        }),
        None => raptor_config::load_config::<&std::path::Path>(None).map_err(|e| {
            eprintln!("failed to load configuration: {e}");
            anyhow::anyhow!(e.to_string())
        }),
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
