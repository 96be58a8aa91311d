use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::types::{CACHE_TTL_MS, DEFAULT_KEY_PREFIX, MAX_ITEMS};

pub const DEFAULT_REMOTE_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_PROBE_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_TTL_CACHE_SECS: u64 = 5 * 60;

/// Top-level config (tether.toml + TETHER_* env overrides).
///
/// Nested keys use a double underscore in env vars, e.g.
/// `TETHER_STORAGE__KEY_PREFIX=@myapp:`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TetherConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite file backing the durable key-value store.
    #[serde(default = "default_db_path")]
    pub path: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            key_prefix: default_key_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    /// Snapshot staleness threshold.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Default lifetime of generic TTL cache entries.
    #[serde(default = "default_ttl_cache_secs")]
    pub ttl_cache_default_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_items: default_max_items(),
            ttl_secs: default_ttl_secs(),
            ttl_cache_default_secs: default_ttl_cache_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ttl_secs as i64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_remote_url")]
    pub base_url: String,
    #[serde(default = "default_remote_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_remote_url(),
            timeout_ms: default_remote_timeout_ms(),
        }
    }
}

/// TCP reachability probe, used where the platform offers no callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_probe_host")]
    pub host: String,
    #[serde(default = "default_probe_port")]
    pub port: u16,
    #[serde(default = "default_probe_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            host: default_probe_host(),
            port: default_probe_port(),
            interval_secs: default_probe_interval_secs(),
            timeout_ms: default_probe_timeout_ms(),
        }
    }
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.tether/tether.db", home)
}
fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}
fn default_max_items() -> usize {
    MAX_ITEMS
}
fn default_ttl_secs() -> u64 {
    (CACHE_TTL_MS / 1000) as u64
}
fn default_ttl_cache_secs() -> u64 {
    DEFAULT_TTL_CACHE_SECS
}
fn default_remote_url() -> String {
    DEFAULT_REMOTE_URL.to_string()
}
fn default_remote_timeout_ms() -> u64 {
    DEFAULT_REMOTE_TIMEOUT_MS
}
fn default_probe_host() -> String {
    "1.1.1.1".to_string()
}
fn default_probe_port() -> u16 {
    443
}
fn default_probe_interval_secs() -> u64 {
    DEFAULT_PROBE_INTERVAL_SECS
}
fn default_probe_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT_MS
}

impl TetherConfig {
    /// Load config from a TOML file with TETHER_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. $TETHER_CONFIG
    ///   3. ~/.tether/tether.toml
    ///
    /// A missing file is not an error; every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("TETHER_CONFIG").ok())
            .unwrap_or_else(default_config_path);

        let config: TetherConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("TETHER_").split("__"))
            .extract()
            .map_err(|e| crate::error::TetherError::Config(e.to_string()))?;

        tracing::debug!(path = %path, "config loaded");
        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.tether/tether.toml", home)
}
