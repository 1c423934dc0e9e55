use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use raptor_job_queue::{
    AdaptiveParams, ArtifactStore, FsArtifactStore, InMemoryArtifactStore, TruncationCriteria,
};
use raptor_jobs::{ProcessEngine, QuantEngine};

/// Build the artifact store: filesystem when a directory is configured,
/// in-memory otherwise.
pub fn artifact_store_from_config(cfg: &raptor_config::Config) -> Arc<dyn ArtifactStore> {
    match &cfg.storage.directory {
        Some(dir) => {
            tracing::info!(directory = %dir, "using filesystem artifact store");
            Arc::new(FsArtifactStore::new(dir))
        }
        None => {
            tracing::warn!("no storage.directory configured; artifacts are kept in memory");
            Arc::new(InMemoryArtifactStore::new())
        }
    }
}

/// Adaptive truncation parameters attached to adaptive jobs.
pub fn adaptive_params_from_config(cfg: &raptor_config::Config) -> AdaptiveParams {
    let a = &cfg.adaptive;
    AdaptiveParams {
        initial: TruncationCriteria {
            limit_order: a.initial_limit_order,
            cut_off: a.initial_cut_off,
        },
        tolerance: a.tolerance,
        max_iterations: a.max_iterations,
        order_step: a.order_step,
        cut_off_factor: a.cut_off_factor,
    }
}

/// Engine used by in-process workers, if one is configured.
pub fn engine_from_config(cfg: &raptor_config::Config) -> Option<Arc<dyn QuantEngine>> {
    let path = cfg.worker.engine_path.as_ref()?;
    Some(Arc::new(ProcessEngine::new(
        path,
        cfg.worker.engine_args.clone(),
    )))
}

/// Parse host:port into a SocketAddr, with fallback to 0.0.0.0.
pub fn parse_bind_address(host: &str, port: u16) -> SocketAddr {
    host.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, port))
        .or_else(|_| host.parse::<SocketAddr>())
        .or_else(|_| host.parse::<Ipv6Addr>().map(|ip| SocketAddr::new(IpAddr::V6(ip), port)))
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_address_falls_back_to_unspecified() {
        assert_eq!(
            parse_bind_address("127.0.0.1", 3000),
            SocketAddr::from(([127, 0, 0, 1], 3000))
        );
        assert_eq!(
            parse_bind_address("localhost", 8080),
            SocketAddr::from(([0, 0, 0, 0], 8080))
        );
    }

    #[test]
    fn adaptive_params_follow_config() {
        let mut cfg = raptor_config::Config::default();
        cfg.adaptive.tolerance = 0.01;
        cfg.adaptive.initial_limit_order = 4;
        let params = adaptive_params_from_config(&cfg);
        assert_eq!(params.tolerance, 0.01);
        assert_eq!(params.initial.limit_order, 4);
        assert_eq!(params.cut_off_factor, 10.0);
    }

    #[test]
    fn engine_only_when_configured() {
        let mut cfg = raptor_config::Config::default();
        assert!(engine_from_config(&cfg).is_none());
        cfg.worker.engine_path = Some("/opt/scram/engine".into());
        assert!(engine_from_config(&cfg).is_some());
    }

    #[tokio::test]
    async fn storage_directory_selects_filesystem_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cfg = raptor_config::Config::default();
        cfg.storage.directory = Some(dir.path().to_string_lossy().into_owned());

        let store = artifact_store_from_config(&cfg);
        store
            .put("inputs/job.json", bytes::Bytes::from_static(b"{}"))
            .await
            .unwrap();
        assert!(dir.path().join("inputs").join("job.json").exists());
    }
}
