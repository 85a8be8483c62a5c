//! Server configuration, deserialized from the single JSON document
//! described in the external-interfaces design. Defaults match that
//! document's table; `Config` is loaded once at startup and threaded
//! through a `Context` rather than read from statics (see `context.rs`).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_num_workers() -> usize {
    2 * std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_request_timeout_millis() -> u64 {
    10_000
}

fn default_idle_timeout_millis() -> u64 {
    15_000
}

fn default_max_frame_length() -> u64 {
    10 * 1024 * 1024
}

fn default_num_repository_workers() -> usize {
    16
}

fn default_removal_grace_period_millis() -> u64 {
    // Open Question in the design notes: the grace window before a
    // soft-removed project/repository becomes purgeable has no documented
    // default upstream. 15 minutes is long enough to undo an operator
    // mistake but short enough that an hourly purge job reclaims space
    // promptly.
    15 * 60 * 1000
}

fn default_write_quota_per_repository() -> u32 {
    16
}

fn default_quota_window_millis() -> u64 {
    1_000
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PortConfig {
    pub local_address: LocalAddress,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_protocol() -> String {
    "http".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LocalAddress {
    pub host: String,
    pub port: u16,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CacheSpecConfig {
    /// Approximate total weight (bytes) the cache may hold.
    #[serde(default = "default_cache_capacity_bytes")]
    pub capacity_bytes: usize,
    /// Entries are dropped on next lookup after this many milliseconds of
    /// no access (expire-after-access).
    #[serde(default = "default_cache_expire_millis")]
    pub expire_after_access_millis: u64,
}

fn default_cache_capacity_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_cache_expire_millis() -> u64 {
    5 * 60 * 1000
}

impl Default for CacheSpecConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: default_cache_capacity_bytes(),
            expire_after_access_millis: default_cache_expire_millis(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GracefulShutdownConfig {
    #[serde(default = "default_quiet_period_millis")]
    pub quiet_period_millis: u64,
    #[serde(default = "default_shutdown_timeout_millis")]
    pub timeout_millis: u64,
}

fn default_quiet_period_millis() -> u64 {
    2_000
}

fn default_shutdown_timeout_millis() -> u64 {
    10_000
}

impl Default for GracefulShutdownConfig {
    fn default() -> Self {
        Self {
            quiet_period_millis: default_quiet_period_millis(),
            timeout_millis: default_shutdown_timeout_millis(),
        }
    }
}

/// `replication.method`: `NONE` runs a single, self-leading replica;
/// quorum-backed coordination is an external collaborator this crate only
/// defines the seam for (see `replication::elector::LeaderElector`).
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplicationMethod {
    #[default]
    None,
    Quorum,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationConfig {
    #[serde(default)]
    pub method: ReplicationMethod,
    #[serde(default)]
    pub replica_id: String,
    #[serde(default)]
    pub connection_string: String,
    #[serde(default)]
    pub path_prefix: String,
    #[serde(default = "default_max_log_count")]
    pub max_log_count: u64,
    #[serde(default = "default_min_log_age_millis")]
    pub min_log_age_millis: u64,
}

fn default_max_log_count() -> u64 {
    100_000
}

fn default_min_log_age_millis() -> u64 {
    60 * 60 * 1000
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            method: ReplicationMethod::default(),
            replica_id: "replica-1".to_string(),
            connection_string: String::new(),
            path_prefix: String::new(),
            max_log_count: default_max_log_count(),
            min_log_age_millis: default_min_log_age_millis(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub data_dir: PathBuf,
    #[serde(default)]
    pub ports: Vec<PortConfig>,
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    #[serde(default)]
    pub max_num_connections: Option<usize>,
    #[serde(default = "default_request_timeout_millis")]
    pub request_timeout_millis: u64,
    #[serde(default = "default_idle_timeout_millis")]
    pub idle_timeout_millis: u64,
    #[serde(default = "default_max_frame_length")]
    pub max_frame_length: u64,
    #[serde(default = "default_num_repository_workers")]
    pub num_repository_workers: usize,
    #[serde(default)]
    pub cache_spec: CacheSpecConfig,
    #[serde(default)]
    pub web_app_enabled: bool,
    #[serde(default)]
    pub graceful_shutdown_timeout: GracefulShutdownConfig,
    #[serde(default)]
    pub replication: ReplicationConfig,
    #[serde(default = "default_write_quota_per_repository")]
    pub write_quota_per_repository: u32,
    #[serde(default = "default_quota_window_millis")]
    pub quota_window_millis: u64,
    #[serde(default = "default_removal_grace_period_millis")]
    pub removal_grace_period_millis: u64,
}

impl Config {
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
