//! Configuration types.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading or validating configuration. All of these are fatal
/// at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub matching: MatchConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub indexers: Vec<IndexerConfig>,
    #[serde(default)]
    pub sonarr: Vec<ArrInstanceConfig>,
    #[serde(default)]
    pub radarr: Vec<ArrInstanceConfig>,
    pub action: ActionConfig,
    #[serde(default)]
    pub client: Option<ClientConfig>,
    #[serde(default)]
    pub sources: SourcesConfig,
}

/// Daemon HTTP surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DaemonConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// When set, requests must carry this key in `X-Api-Key`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_key: None,
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().expect("valid default host")
}

fn default_port() -> u16 {
    2468
}

/// Decision cache database configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("reseeder.db")
}

/// Matcher knobs. This struct is part of the matcher's pure input.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MatchConfig {
    /// Allowed relative deviation between candidate size and searchee size
    /// before fetching metadata.
    #[serde(default = "default_size_fuzz")]
    pub size_fuzz: f64,
    /// Accept candidates whose files are a subset of the searchee's.
    #[serde(default)]
    pub allow_partial: bool,
    /// Minimum share of the candidate's bytes that must be present locally
    /// for a partial match.
    #[serde(default = "default_partial_threshold")]
    pub partial_threshold: f64,
    /// Accept single-file candidates matching on size alone.
    #[serde(default)]
    pub allow_size_only: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            size_fuzz: default_size_fuzz(),
            allow_partial: false,
            partial_threshold: default_partial_threshold(),
            allow_size_only: false,
        }
    }
}

fn default_size_fuzz() -> f64 {
    0.025
}

fn default_partial_threshold() -> f64 {
    1.0
}

/// Decision retention policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    /// Seconds after which a DOWNLOAD_FAILED decision may be retried.
    #[serde(default = "default_download_failed_recheck_secs")]
    pub download_failed_recheck_secs: u64,
    /// Seconds after which negative decisions expire. 0 means never.
    #[serde(default)]
    pub expire_negative_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            download_failed_recheck_secs: default_download_failed_recheck_secs(),
            expire_negative_secs: 0,
        }
    }
}

fn default_download_failed_recheck_secs() -> u64 {
    3600
}

/// Search pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Minimum seconds between searches of the same searchee.
    #[serde(default = "default_cadence_secs")]
    pub cadence_secs: u64,
    /// Global cap on concurrent indexer/client HTTP calls.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-operation deadline in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Per-cycle deadline in seconds.
    #[serde(default = "default_cycle_timeout_secs")]
    pub cycle_timeout_secs: u64,
    /// How often the scheduler looks for due searchees, in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            cadence_secs: default_cadence_secs(),
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
            cycle_timeout_secs: default_cycle_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl SearchConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }
}

fn default_cadence_secs() -> u64 {
    93600 // 26 hours, drifts across daily tracker cycles
}

fn default_concurrency() -> usize {
    8
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_cycle_timeout_secs() -> u64 {
    600
}

fn default_poll_interval_secs() -> u64 {
    60
}

/// One Torznab indexer.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexerConfig {
    /// Stable identifier used in decision rows and logs.
    pub id: String,
    /// Torznab endpoint, e.g. "https://indexer.example/api".
    pub url: String,
    pub apikey: String,
    /// Requests per minute.
    #[serde(default = "default_rate_limit_rpm")]
    pub rate_limit_rpm: u32,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_rate_limit_rpm() -> u32 {
    6
}

fn default_true() -> bool {
    true
}

/// One Sonarr or Radarr instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArrInstanceConfig {
    pub url: String,
    pub apikey: String,
}

/// What to do with accepted matches.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActionConfig {
    pub mode: ActionMode,
    /// Where SAVE mode writes `.torrent` files.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Where INJECT mode links partial-match data for the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_dir: Option<PathBuf>,
    /// Permit falling back to copying when a hardlink crosses devices.
    #[serde(default)]
    pub link_fallback_copy: bool,
    /// Category applied to injected torrents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Tags applied to injected torrents.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

/// Dispatch mode for accepted matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionMode {
    Save,
    Inject,
}

/// Retry behavior for failed client injections.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Delays are capped at this value.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Each retry waits `initial_delay * multiplier^(attempt-1)`.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    5000
}

fn default_max_delay_ms() -> u64 {
    900_000 // 15 minutes
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    /// Delay before the given attempt (1-indexed), or `None` once
    /// `max_attempts` is exhausted.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt > self.max_attempts {
            return None;
        }
        let exponent = attempt.saturating_sub(1) as f64;
        let delay_ms = self.initial_delay_ms as f64 * self.backoff_multiplier.powf(exponent);
        Some(Duration::from_millis(delay_ms.min(self.max_delay_ms as f64) as u64))
    }
}

/// BitTorrent client backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    pub backend: ClientBackend,
    #[serde(default)]
    pub qbittorrent: Option<QBittorrentConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientBackend {
    #[serde(rename = "qbittorrent")]
    QBittorrent,
}

/// qBittorrent Web UI connection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QBittorrentConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Where searchees are enumerated from.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SourcesConfig {
    /// Directories containing `.torrent` files.
    #[serde(default)]
    pub torrent_dirs: Vec<PathBuf>,
    /// Directories whose children are treated as data-dir searchees.
    #[serde(default)]
    pub data_dirs: Vec<PathBuf>,
    /// Also enumerate torrents reported by the configured client.
    #[serde(default)]
    pub use_client: bool,
}

/// Config mirror with secrets redacted, safe for API exposure.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub daemon: SanitizedDaemonConfig,
    pub database: DatabaseConfig,
    pub matching: MatchConfig,
    pub retention: RetentionConfig,
    pub search: SearchConfig,
    pub indexers: Vec<SanitizedIndexerConfig>,
    pub sonarr_instances: usize,
    pub radarr_instances: usize,
    pub action: SanitizedActionConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedDaemonConfig {
    pub host: IpAddr,
    pub port: u16,
    pub auth_enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedIndexerConfig {
    pub id: String,
    pub url: String,
    pub rate_limit_rpm: u32,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedActionConfig {
    pub mode: ActionMode,
    pub output_dir: PathBuf,
    pub link_dir: Option<PathBuf>,
    pub link_fallback_copy: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            daemon: SanitizedDaemonConfig {
                host: config.daemon.host,
                port: config.daemon.port,
                auth_enabled: config.daemon.api_key.is_some(),
            },
            database: config.database.clone(),
            matching: config.matching.clone(),
            retention: config.retention.clone(),
            search: config.search.clone(),
            indexers: config
                .indexers
                .iter()
                .map(|i| SanitizedIndexerConfig {
                    id: i.id.clone(),
                    url: i.url.clone(),
                    rate_limit_rpm: i.rate_limit_rpm,
                    active: i.active,
                })
                .collect(),
            sonarr_instances: config.sonarr.len(),
            radarr_instances: config.radarr.len(),
            action: SanitizedActionConfig {
                mode: config.action.mode,
                output_dir: config.action.output_dir.clone(),
                link_dir: config.action.link_dir.clone(),
                link_fallback_copy: config.action.link_fallback_copy,
            },
        }
    }
}
