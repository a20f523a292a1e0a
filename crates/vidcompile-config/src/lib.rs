//! Configuration loading for the video-compilation service.
//!
//! Every section is parsed from TOML with `#[serde(default)]` so a config
//! file only needs to override what it cares about, then environment
//! variables are applied on top.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "failed to read config file: {e}"),
            ConfigError::Parse(e) => write!(f, "failed to parse config file: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Accepts either a comma-joined string or a TOML array at the config layer;
    /// always normalized to a list by the time it reaches the router.
    pub cors_origins: CorsOrigins,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            cors_origins: CorsOrigins::default(),
        }
    }
}

/// A config value that may be written in TOML as either `"a, b, c"` or `["a", "b", "c"]`.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct CorsOrigins(pub Vec<String>);

impl<'de> Deserialize<'de> for CorsOrigins {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            List(Vec<String>),
            Csv(String),
        }
        let repr = Repr::deserialize(deserializer)?;
        Ok(match repr {
            Repr::List(items) => CorsOrigins(items),
            Repr::Csv(s) => CorsOrigins(
                s.split(',')
                    .map(|part| part.trim().to_string())
                    .filter(|part| !part.is_empty())
                    .collect(),
            ),
        })
    }
}

fn default_store_url() -> String {
    "postgres://localhost/vidcompile".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub url: String,
    pub service_key: String,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            service_key: String::new(),
            max_connections: 10,
        }
    }
}

fn default_warehouse_url() -> String {
    "postgres://localhost/vidcompile_warehouse".to_string()
}

fn default_channel_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    pub url: String,
    pub project_id: String,
    pub channel_cache_ttl_secs: u64,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            url: default_warehouse_url(),
            project_id: String::new(),
            channel_cache_ttl_secs: default_channel_cache_ttl_secs(),
        }
    }
}

fn default_broker_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_stale_job_poll_secs() -> u64 {
    60
}

fn default_stale_job_age_secs() -> i64 {
    5 * 60
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub url: String,
    pub stale_job_poll_secs: u64,
    pub stale_job_age_secs: i64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: default_broker_url(),
            stale_job_poll_secs: default_stale_job_poll_secs(),
            stale_job_age_secs: default_stale_job_age_secs(),
        }
    }
}

/// One entry in the share↔drive↔mount table (§6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareMapping {
    pub share: String,
    pub drive_letter: Option<String>,
    pub container_mount: Option<String>,
}

fn default_output_root() -> String {
    "/mnt/share/output".to_string()
}

fn default_keep_alive_interval_secs() -> u64 {
    5
}

fn default_network_host() -> String {
    "192.168.1.6".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub output_root: String,
    pub temp_dir: String,
    pub shares: Vec<ShareMapping>,
    pub keep_alive_interval_secs: u64,
    /// True when this process runs inside an isolated-network container where
    /// shares are bind-mounted rather than reachable over UNC/SMB directly.
    pub containerized: bool,
    /// Host component re-emitted when normalizing into UNC form (`\\HOST\SHARE\...`).
    pub network_host: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            temp_dir: std::env::temp_dir().to_string_lossy().to_string(),
            shares: default_share_mappings(),
            keep_alive_interval_secs: default_keep_alive_interval_secs(),
            containerized: false,
            network_host: default_network_host(),
        }
    }
}

fn default_share_mappings() -> Vec<ShareMapping> {
    let table: &[(&str, Option<&str>, Option<&str>)] = &[
        ("Share", Some("S:"), Some("/mnt/share")),
        ("Share2", Some("T:"), Some("/mnt/share2")),
        ("Share3", Some("U:"), Some("/mnt/share3")),
        ("Share4", Some("V:"), Some("/mnt/share4")),
        ("Share5", Some("W:"), Some("/mnt/share5")),
        ("New_Share_1", Some("O:"), None),
        ("New_Share_2", Some("P:"), None),
        ("New_Share_3", Some("Q:"), None),
        ("New_Share_4", Some("R:"), None),
    ];
    table
        .iter()
        .map(|(share, drive, mount)| ShareMapping {
            share: share.to_string(),
            drive_letter: drive.map(|s| s.to_string()),
            container_mount: mount.map(|s| s.to_string()),
        })
        .collect()
}

fn default_transcoder_binary() -> String {
    "ffmpeg".to_string()
}

fn default_probe_binary() -> String {
    "ffprobe".to_string()
}

fn default_probe_parallelism() -> usize {
    8
}

fn default_copy_parallelism() -> usize {
    5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscoderConfig {
    pub binary: String,
    pub probe_binary: String,
    pub probe_parallelism: usize,
    pub copy_parallelism: usize,
    pub prefer_gpu_encoder: bool,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            binary: default_transcoder_binary(),
            probe_binary: default_probe_binary(),
            probe_parallelism: default_probe_parallelism(),
            copy_parallelism: default_copy_parallelism(),
            prefer_gpu_encoder: true,
        }
    }
}

fn default_max_concurrent_jobs() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub max_concurrent_jobs: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
        }
    }
}

fn default_log_dir() -> String {
    "/var/log/vidcompile".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub dir: String,
    /// "compact" or "json" — selects the `tracing-subscriber` formatter.
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub warehouse: WarehouseConfig,
    pub broker: BrokerConfig,
    pub paths: PathsConfig,
    pub transcoder: TranscoderConfig,
    pub concurrency: ConcurrencyConfig,
    pub log: LogConfig,
}

impl Config {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        parse_toml(&content)
    }

    /// Loads from `path`, then applies environment-variable overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("VIDCOMPILE_SERVER_HOST") {
            self.server.host = v;
        }
        if let Ok(v) = std::env::var("VIDCOMPILE_SERVER_PORT") {
            if let Ok(parsed) = v.parse() {
                self.server.port = parsed;
            }
        }
        if let Ok(v) = std::env::var("VIDCOMPILE_CORS_ORIGINS") {
            self.server.cors_origins = CorsOrigins(
                v.split(',')
                    .map(|part| part.trim().to_string())
                    .filter(|part| !part.is_empty())
                    .collect(),
            );
        }
        if let Ok(v) = std::env::var("VIDCOMPILE_STORE_URL") {
            self.store.url = v;
        }
        if let Ok(v) = std::env::var("VIDCOMPILE_STORE_SERVICE_KEY") {
            self.store.service_key = v;
        }
        if let Ok(v) = std::env::var("VIDCOMPILE_WAREHOUSE_URL") {
            self.warehouse.url = v;
        }
        if let Ok(v) = std::env::var("VIDCOMPILE_WAREHOUSE_PROJECT_ID") {
            self.warehouse.project_id = v;
        }
        if let Ok(v) = std::env::var("VIDCOMPILE_BROKER_URL") {
            self.broker.url = v;
        }
        if let Ok(v) = std::env::var("VIDCOMPILE_OUTPUT_ROOT") {
            self.paths.output_root = v;
        }
        if let Ok(v) = std::env::var("VIDCOMPILE_TEMP_DIR") {
            self.paths.temp_dir = v;
        }
        if let Ok(v) = std::env::var("VIDCOMPILE_CONTAINERIZED") {
            if let Some(parsed) = parse_bool_env(&v) {
                self.paths.containerized = parsed;
            }
        }
        if let Ok(v) = std::env::var("VIDCOMPILE_TRANSCODER_BINARY") {
            self.transcoder.binary = v;
        }
        if let Ok(v) = std::env::var("VIDCOMPILE_MAX_CONCURRENT_JOBS") {
            if let Ok(parsed) = v.parse() {
                self.concurrency.max_concurrent_jobs = parsed;
            }
        }
        if let Ok(v) = std::env::var("VIDCOMPILE_LOG_DIR") {
            self.log.dir = v;
        }
        if let Ok(v) = std::env::var("VIDCOMPILE_LOG_FORMAT") {
            self.log.format = v;
        }
    }

    /// Share name -> mapping, built once at startup for the path normalizer.
    pub fn share_table(&self) -> HashMap<String, ShareMapping> {
        self.paths
            .shares
            .iter()
            .cloned()
            .map(|s| (s.share.clone(), s))
            .collect()
    }
}

fn parse_bool_env(v: &str) -> Option<bool> {
    match v.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

pub fn parse_toml(content: &str) -> Result<Config, ConfigError> {
    Ok(toml::from_str(content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse_toml("").unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.paths.shares.len(), 9);
        assert_eq!(config.concurrency.max_concurrent_jobs, 1);
    }

    #[test]
    fn partial_config_fills_remaining_defaults() {
        let toml_str = r#"
            [server]
            port = 9100
        "#;
        let config = parse_toml(toml_str).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.broker.url, "redis://127.0.0.1:6379");
    }

    #[test]
    fn cors_origins_accepts_csv_or_list() {
        let csv = parse_toml(r#"[server]
cors_origins = "a.com, b.com"
"#)
        .unwrap();
        assert_eq!(
            csv.server.cors_origins.0,
            vec!["a.com".to_string(), "b.com".to_string()]
        );

        let list = parse_toml(r#"[server]
cors_origins = ["a.com", "b.com"]
"#)
        .unwrap();
        assert_eq!(list.server.cors_origins.0, csv.server.cors_origins.0);
    }

    #[test]
    fn env_override_server_port() {
        let _guard = ENV_MUTEX.lock().unwrap();
        std::env::set_var("VIDCOMPILE_SERVER_PORT", "9999");
        let mut config = Config::default();
        config.apply_env_overrides();
        std::env::remove_var("VIDCOMPILE_SERVER_PORT");
        assert_eq!(config.server.port, 9999);
    }

    #[test]
    fn env_override_containerized_bool() {
        let _guard = ENV_MUTEX.lock().unwrap();
        std::env::set_var("VIDCOMPILE_CONTAINERIZED", "yes");
        let mut config = Config::default();
        config.apply_env_overrides();
        std::env::remove_var("VIDCOMPILE_CONTAINERIZED");
        assert!(config.paths.containerized);
    }

    #[test]
    fn env_override_ignored_on_bad_port() {
        let _guard = ENV_MUTEX.lock().unwrap();
        std::env::set_var("VIDCOMPILE_SERVER_PORT", "not-a-number");
        let mut config = Config::default();
        let before = config.server.port;
        config.apply_env_overrides();
        std::env::remove_var("VIDCOMPILE_SERVER_PORT");
        assert_eq!(config.server.port, before);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_env_override_port_roundtrips(port in 1u16..=65535u16) {
            let _guard = ENV_MUTEX.lock().unwrap();
            std::env::set_var("VIDCOMPILE_SERVER_PORT", port.to_string());
            let mut config = Config::default();
            config.apply_env_overrides();
            std::env::remove_var("VIDCOMPILE_SERVER_PORT");
            prop_assert_eq!(config.server.port, port);
        }

        #[test]
        fn prop_parses_arbitrary_max_concurrent_jobs(n in 1usize..64) {
            let toml_str = format!("[concurrency]\nmax_concurrent_jobs = {n}\n");
            let config = parse_toml(&toml_str).unwrap();
            prop_assert_eq!(config.concurrency.max_concurrent_jobs, n);
        }
    }
}
