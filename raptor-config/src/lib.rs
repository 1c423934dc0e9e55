use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Pre-compiled regex for hostname validation (compiled once at first use)
static HOSTNAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9]([-a-zA-Z0-9\.]*[a-zA-Z0-9])?$").unwrap());

#[derive(Debug, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub server: Option<ServerSection>,
    #[serde(default)]
    pub logging: Option<LoggingSection>,
    #[serde(default)]
    pub storage: Option<StorageSection>,
    #[serde(default)]
    pub dispatch: Option<DispatchSection>,
    #[serde(default)]
    pub worker: Option<WorkerSection>,
    #[serde(default)]
    pub adaptive: Option<AdaptiveSection>,
}

#[derive(Debug, Deserialize)]
pub struct ServerSection {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub body_limit_mb: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub json: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct StorageSection {
    #[serde(default)]
    pub directory: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DispatchSection {
    #[serde(default)]
    pub fan_out: Option<usize>,
    #[serde(default)]
    pub queue_capacity: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct WorkerSection {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub engine_path: Option<String>,
    #[serde(default)]
    pub engine_args: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct AdaptiveSection {
    #[serde(default)]
    pub tolerance: Option<f64>,
    #[serde(default)]
    pub initial_limit_order: Option<u32>,
    #[serde(default)]
    pub initial_cut_off: Option<f64>,
    #[serde(default)]
    pub max_iterations: Option<u32>,
    #[serde(default)]
    pub order_step: Option<u32>,
    #[serde(default)]
    pub cut_off_factor: Option<f64>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Load a RawConfigFile from a path. The format is inferred from the extension: .toml, .yaml/.yml, .json
pub fn load_raw_from_file<P: AsRef<Path>>(path: P) -> Result<RawConfigFile, ConfigError> {
    let path = path.as_ref();
    let s = fs::read_to_string(path)?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase());
    parse_config_str(&s, ext.as_deref())
}

/// Parse configuration from a string with optional format hint
#[inline]
fn parse_config_str(s: &str, ext: Option<&str>) -> Result<RawConfigFile, ConfigError> {
    match ext {
        #[cfg(feature = "toml")]
        Some("toml") => toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string())),
        #[cfg(feature = "yaml")]
        Some("yaml" | "yml") => {
            serde_yaml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
        }
        #[cfg(feature = "json")]
        Some("json") => serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string())),
        _ => parse_config_auto(s),
    }
}

/// Try to parse config by attempting each enabled format
#[inline]
fn parse_config_auto(s: &str) -> Result<RawConfigFile, ConfigError> {
    #[cfg(feature = "yaml")]
    if let Ok(cfg) = serde_yaml::from_str(s) {
        return Ok(cfg);
    }

    #[cfg(feature = "toml")]
    if let Ok(cfg) = toml::from_str(s) {
        return Ok(cfg);
    }

    #[cfg(feature = "json")]
    if let Ok(cfg) = serde_json::from_str(s) {
        return Ok(cfg);
    }

    #[cfg(any(feature = "yaml", feature = "toml", feature = "json"))]
    {
        Err(ConfigError::Parse(
            "failed to parse config as any supported format".into(),
        ))
    }

    #[cfg(not(any(feature = "yaml", feature = "toml", feature = "json")))]
    {
        let _ = s;
        Err(ConfigError::Parse("no config format enabled".into()))
    }
}

/// Concrete service configuration with defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub dispatch: DispatchConfig,
    pub worker: WorkerConfig,
    pub adaptive: AdaptiveConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted request body; PRA models can be large.
    pub body_limit_mb: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

/// Where job inputs and outputs are kept. `None` keeps them in memory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageConfig {
    pub directory: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchConfig {
    /// Sequence jobs of one batch persisted and published concurrently.
    pub fan_out: usize,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerConfig {
    pub enabled: bool,
    pub concurrency: usize,
    pub engine_path: Option<String>,
    pub engine_args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdaptiveConfig {
    pub tolerance: f64,
    pub initial_limit_order: u32,
    pub initial_cut_off: f64,
    pub max_iterations: u32,
    pub order_step: u32,
    pub cut_off_factor: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                body_limit_mb: 50,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                json: false,
            },
            storage: StorageConfig { directory: None },
            dispatch: DispatchConfig {
                fan_out: 8,
                queue_capacity: 1024,
            },
            worker: WorkerConfig {
                enabled: false,
                concurrency: 2,
                engine_path: None,
                engine_args: Vec::new(),
            },
            adaptive: AdaptiveConfig {
                tolerance: 0.05,
                initial_limit_order: 3,
                initial_cut_off: 1e-8,
                max_iterations: 5,
                order_step: 1,
                cut_off_factor: 10.0,
            },
        }
    }
}

#[inline]
fn parse_bool(s: &str) -> Result<bool, ()> {
    let bytes = s.as_bytes();
    match bytes {
        b"1" | b"true" | b"TRUE" | b"True" | b"yes" | b"YES" | b"Yes" | b"y" | b"Y" => Ok(true),
        b"0" | b"false" | b"FALSE" | b"False" | b"no" | b"NO" | b"No" | b"n" | b"N" => Ok(false),
        _ => match s.to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" => Ok(true),
            "false" | "no" | "n" => Ok(false),
            _ => Err(()),
        },
    }
}

#[inline]
fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .filter_map(|p| {
            let trimmed = p.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

/// Helper macro to apply optional value if present
macro_rules! apply_opt {
    ($target:expr, $source:expr) => {
        if let Some(v) = $source {
            $target = v;
        }
    };
    ($target:expr, $source:expr, wrap) => {
        if let Some(v) = $source {
            $target = Some(v);
        }
    };
}

/// Load concrete `Config` from optional file and environment variables.
/// Environment variables take precedence over file values and defaults.
pub fn load_config<P: AsRef<Path>>(path: Option<P>) -> Result<Config, ConfigError> {
    let mut cfg = Config::default();

    if let Some(p) = path {
        apply_file(&mut cfg, load_raw_from_file(p)?);
    }

    apply_env_overrides(&mut cfg)?;

    Ok(cfg)
}

fn apply_file(cfg: &mut Config, raw: RawConfigFile) {
    if let Some(server) = raw.server {
        apply_opt!(cfg.server.host, server.host);
        apply_opt!(cfg.server.port, server.port);
        apply_opt!(cfg.server.body_limit_mb, server.body_limit_mb);
    }
    if let Some(logging) = raw.logging {
        apply_opt!(cfg.logging.level, logging.level);
        apply_opt!(cfg.logging.json, logging.json);
    }
    if let Some(storage) = raw.storage {
        apply_opt!(cfg.storage.directory, storage.directory, wrap);
    }
    if let Some(dispatch) = raw.dispatch {
        apply_opt!(cfg.dispatch.fan_out, dispatch.fan_out);
        apply_opt!(cfg.dispatch.queue_capacity, dispatch.queue_capacity);
    }
    if let Some(worker) = raw.worker {
        apply_opt!(cfg.worker.enabled, worker.enabled);
        apply_opt!(cfg.worker.concurrency, worker.concurrency);
        apply_opt!(cfg.worker.engine_path, worker.engine_path, wrap);
        apply_opt!(cfg.worker.engine_args, worker.engine_args);
    }
    if let Some(a) = raw.adaptive {
        apply_opt!(cfg.adaptive.tolerance, a.tolerance);
        apply_opt!(cfg.adaptive.initial_limit_order, a.initial_limit_order);
        apply_opt!(cfg.adaptive.initial_cut_off, a.initial_cut_off);
        apply_opt!(cfg.adaptive.max_iterations, a.max_iterations);
        apply_opt!(cfg.adaptive.order_step, a.order_step);
        apply_opt!(cfg.adaptive.cut_off_factor, a.cut_off_factor);
    }
}

/// Helper to parse env var as a specific type
#[inline]
fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Parse(format!("invalid {}: {}", key, e))),
        Err(_) => Ok(None),
    }
}

/// Helper to parse env var as bool
#[inline]
fn env_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    match env::var(key) {
        Ok(v) => parse_bool(&v)
            .map(Some)
            .map_err(|_| ConfigError::Parse(format!("invalid {}", key))),
        Err(_) => Ok(None),
    }
}

/// Helper to get env var as string
#[inline]
fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

/// Apply all environment variable overrides to config
fn apply_env_overrides(cfg: &mut Config) -> Result<(), ConfigError> {
    // Server
    if let Some(v) = env_str("RAPTOR_SERVER_HOST") {
        cfg.server.host = v;
    }
    if let Some(v) = env_parse::<u16>("RAPTOR_SERVER_PORT")? {
        cfg.server.port = v;
    }
    if let Some(v) = env_parse::<usize>("RAPTOR_BODY_LIMIT_MB")? {
        cfg.server.body_limit_mb = v;
    }

    // Logging
    if let Some(v) = env_str("RAPTOR_LOG_LEVEL") {
        cfg.logging.level = v;
    }
    if let Some(v) = env_bool("RAPTOR_LOG_JSON")? {
        cfg.logging.json = v;
    }

    // Storage
    if let Some(v) = env_str("RAPTOR_STORAGE_DIRECTORY") {
        cfg.storage.directory = Some(v);
    }

    // Dispatch
    if let Some(v) = env_parse::<usize>("RAPTOR_DISPATCH_FAN_OUT")? {
        cfg.dispatch.fan_out = v;
    }
    if let Some(v) = env_parse::<usize>("RAPTOR_DISPATCH_QUEUE_CAPACITY")? {
        cfg.dispatch.queue_capacity = v;
    }

    // Worker
    if let Some(v) = env_bool("RAPTOR_WORKER_ENABLED")? {
        cfg.worker.enabled = v;
    }
    if let Some(v) = env_parse::<usize>("RAPTOR_WORKER_CONCURRENCY")? {
        cfg.worker.concurrency = v;
    }
    if let Some(v) = env_str("RAPTOR_ENGINE_PATH") {
        cfg.worker.engine_path = Some(v);
    }
    if let Some(v) = env_str("RAPTOR_ENGINE_ARGS") {
        cfg.worker.engine_args = split_csv(&v);
    }

    // Adaptive truncation
    if let Some(v) = env_parse::<f64>("RAPTOR_ADAPTIVE_TOLERANCE")? {
        cfg.adaptive.tolerance = v;
    }
    if let Some(v) = env_parse::<u32>("RAPTOR_ADAPTIVE_MAX_ITERATIONS")? {
        cfg.adaptive.max_iterations = v;
    }

    Ok(())
}

/// Validate higher-level constraints on the resolved configuration.
pub fn validate_config(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.server.port == 0 {
        return Err(ConfigError::Validation("server.port must be > 0".into()));
    }
    // validate server.host: allow IPs or simple hostname pattern
    let host_ok = cfg.server.host.parse::<std::net::IpAddr>().is_ok()
        || HOSTNAME_REGEX.is_match(&cfg.server.host);
    if !host_ok {
        return Err(ConfigError::Validation(format!(
            "invalid server.host: {}",
            cfg.server.host
        )));
    }

    if cfg.dispatch.fan_out == 0 {
        return Err(ConfigError::Validation(
            "dispatch.fan_out must be >= 1".into(),
        ));
    }
    if cfg.dispatch.queue_capacity == 0 {
        return Err(ConfigError::Validation(
            "dispatch.queue_capacity must be >= 1".into(),
        ));
    }

    if cfg.worker.concurrency == 0 {
        return Err(ConfigError::Validation(
            "worker.concurrency must be >= 1".into(),
        ));
    }
    if cfg.worker.enabled
        && cfg
            .worker
            .engine_path
            .as_deref()
            .map(|s| s.is_empty())
            .unwrap_or(true)
    {
        return Err(ConfigError::Validation(
            "worker.engine_path must be set when workers are enabled".to_string(),
        ));
    }

    let a = &cfg.adaptive;
    if !(a.tolerance > 0.0 && a.tolerance < 1.0) {
        return Err(ConfigError::Validation(format!(
            "adaptive.tolerance must be in (0, 1): {}",
            a.tolerance
        )));
    }
    if !(a.initial_cut_off > 0.0 && a.initial_cut_off < 1.0) {
        return Err(ConfigError::Validation(format!(
            "adaptive.initial_cut_off must be in (0, 1): {}",
            a.initial_cut_off
        )));
    }
    if a.max_iterations == 0 {
        return Err(ConfigError::Validation(
            "adaptive.max_iterations must be >= 1".into(),
        ));
    }
    if !(a.cut_off_factor > 1.0) {
        return Err(ConfigError::Validation(format!(
            "adaptive.cut_off_factor must be > 1: {}",
            a.cut_off_factor
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn write_config(suffix: &str, body: &str) -> NamedTempFile {
        let f = tempfile::Builder::new()
            .suffix(suffix)
            .tempfile()
            .expect("tmpfile");
        std::fs::write(f.path(), body).unwrap();
        f
    }

    #[test]
    fn parse_toml() {
        let f = write_config(
            ".toml",
            r#"
[server]
host = "127.0.0.1"
port = 6000

[dispatch]
fan_out = 4

[worker]
enabled = true
engine_path = "/usr/bin/scram-engine"
engine_args = ["--json"]
"#,
        );
        let raw = load_raw_from_file(f.path()).expect("load");
        let s = raw.server.as_ref().unwrap();
        assert_eq!(s.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(s.port, Some(6000));

        let mut cfg = Config::default();
        apply_file(&mut cfg, raw);
        assert_eq!(cfg.dispatch.fan_out, 4);
        assert_eq!(cfg.dispatch.queue_capacity, 1024);
        assert!(cfg.worker.enabled);
        assert_eq!(cfg.worker.engine_args, vec!["--json".to_string()]);
        validate_config(&cfg).expect("valid");
    }

    #[test]
    fn parse_yaml() {
        let f = write_config(
            ".yaml",
            r#"
server:
  host: 0.0.0.0
  port: 9000
storage:
  directory: /var/lib/raptor
adaptive:
  tolerance: 0.01
  max_iterations: 8
"#,
        );
        let mut cfg = Config::default();
        apply_file(&mut cfg, load_raw_from_file(f.path()).expect("load"));
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.storage.directory.as_deref(), Some("/var/lib/raptor"));
        assert_eq!(cfg.adaptive.tolerance, 0.01);
        assert_eq!(cfg.adaptive.max_iterations, 8);
        assert_eq!(cfg.adaptive.initial_limit_order, 3);
    }

    #[test]
    fn auto_detects_json_without_extension() {
        let f = write_config("", r#"{ "logging": { "level": "debug", "json": true } }"#);
        let raw = load_raw_from_file(f.path()).expect("load");
        let logging = raw.logging.unwrap();
        assert_eq!(logging.level.as_deref(), Some("debug"));
        assert_eq!(logging.json, Some(true));
    }

    #[test]
    fn env_overrides() {
        let keys = [
            "RAPTOR_SERVER_HOST",
            "RAPTOR_SERVER_PORT",
            "RAPTOR_LOG_JSON",
            "RAPTOR_DISPATCH_FAN_OUT",
            "RAPTOR_ENGINE_ARGS",
            "RAPTOR_ADAPTIVE_TOLERANCE",
        ];
        for k in &keys {
            std::env::remove_var(k);
        }

        std::env::set_var("RAPTOR_SERVER_HOST", "10.1.2.3");
        std::env::set_var("RAPTOR_SERVER_PORT", "1234");
        std::env::set_var("RAPTOR_LOG_JSON", "yes");
        std::env::set_var("RAPTOR_DISPATCH_FAN_OUT", "16");
        std::env::set_var("RAPTOR_ENGINE_ARGS", "--quiet, --json");
        std::env::set_var("RAPTOR_ADAPTIVE_TOLERANCE", "0.2");

        let cfg = load_config::<&Path>(None).expect("load config");
        assert_eq!(cfg.server.host, "10.1.2.3");
        assert_eq!(cfg.server.port, 1234);
        assert!(cfg.logging.json);
        assert_eq!(cfg.dispatch.fan_out, 16);
        assert_eq!(cfg.worker.engine_args, vec!["--quiet", "--json"]);
        assert_eq!(cfg.adaptive.tolerance, 0.2);

        for k in &keys {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn csv_split() {
        let parts = split_csv("--a, --b, , --c");
        assert_eq!(parts, vec!["--a", "--b", "--c"]);
    }

    #[test]
    fn defaults_are_valid() {
        validate_config(&Config::default()).expect("defaults validate");
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut cfg = Config::default();
        cfg.dispatch.fan_out = 0;
        assert!(matches!(validate_config(&cfg), Err(ConfigError::Validation(_))));

        let mut cfg = Config::default();
        cfg.adaptive.tolerance = 1.5;
        assert!(validate_config(&cfg).is_err());

        let mut cfg = Config::default();
        cfg.adaptive.cut_off_factor = 1.0;
        assert!(validate_config(&cfg).is_err());

        let mut cfg = Config::default();
        cfg.server.host = "bad host!".into();
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn enabled_worker_needs_an_engine() {
        let mut cfg = Config::default();
        cfg.worker.enabled = true;
        assert!(validate_config(&cfg).is_err());
        cfg.worker.engine_path = Some("/opt/engine".into());
        assert!(validate_config(&cfg).is_ok());
    }
}
