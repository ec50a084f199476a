//! Configuration for the outreach engine

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable pointing at an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "OUTREACH_CONFIG";

/// Prefix for environment overrides, e.g. `OUTREACH__DATABASE__URL`
pub const ENV_PREFIX: &str = "OUTREACH";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// HTTP listener for tracking, health and metrics
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Sequence scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Worker pool configuration
    #[serde(default)]
    pub workers: WorkerConfig,

    /// Warmup configuration
    #[serde(default)]
    pub warmup: WarmupConfig,

    /// Tracking configuration
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Channel driver configuration
    #[serde(default)]
    pub channels: ChannelConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Hostname used in generated Message-IDs
    #[serde(default = "default_hostname")]
    pub hostname: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
        }
    }
}

fn default_hostname() -> String {
    "localhost".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database backend: "postgres" or "memory"
    #[serde(default = "default_db_backend")]
    pub backend: String,

    /// Database URL (for postgres)
    pub url: Option<String>,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: default_db_backend(),
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

fn default_db_backend() -> String {
    "postgres".to_string()
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    2
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Bind address for the tracking/health/metrics listener
    #[serde(default = "default_api_bind")]
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: default_api_bind(),
        }
    }
}

fn default_api_bind() -> String {
    "0.0.0.0:8080".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Sequence scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between sequence-advance cycles per campaign
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_secs: u64,

    /// Maximum due contacts processed per campaign cycle
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// Consecutive send failures after which an enrollment is deactivated (0 = never)
    #[serde(default = "default_max_send_errors")]
    pub max_send_errors: i32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: default_cycle_interval(),
            batch_size: default_batch_size(),
            max_send_errors: default_max_send_errors(),
        }
    }
}

fn default_cycle_interval() -> u64 {
    300
}

fn default_batch_size() -> i64 {
    100
}

fn default_max_send_errors() -> i32 {
    5
}

/// Worker pool configuration, one concurrency limit per job category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Seconds between queue polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Concurrent sequence-advance jobs
    #[serde(default = "default_sequence_concurrency")]
    pub sequence_concurrency: usize,

    /// Concurrent warmup jobs
    #[serde(default = "default_warmup_concurrency")]
    pub warmup_concurrency: usize,

    /// Concurrent channel-action jobs
    #[serde(default = "default_channel_concurrency")]
    pub channel_concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            sequence_concurrency: default_sequence_concurrency(),
            warmup_concurrency: default_warmup_concurrency(),
            channel_concurrency: default_channel_concurrency(),
        }
    }
}

fn default_poll_interval() -> u64 {
    5
}

fn default_sequence_concurrency() -> usize {
    2
}

fn default_warmup_concurrency() -> usize {
    1
}

fn default_channel_concurrency() -> usize {
    3
}

/// Warmup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmupConfig {
    /// Run the daily warmup for accounts in `warming`
    #[serde(default = "default_warmup_enabled")]
    pub enabled: bool,

    /// Lower bound of the pause between two warmup exchanges
    #[serde(default = "default_warmup_min_delay")]
    pub min_delay_minutes: u64,

    /// Upper bound of the pause between two warmup exchanges
    #[serde(default = "default_warmup_max_delay")]
    pub max_delay_minutes: u64,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            enabled: default_warmup_enabled(),
            min_delay_minutes: default_warmup_min_delay(),
            max_delay_minutes: default_warmup_max_delay(),
        }
    }
}

fn default_warmup_enabled() -> bool {
    true
}

fn default_warmup_min_delay() -> u64 {
    5
}

fn default_warmup_max_delay() -> u64 {
    15
}

/// Tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Public base URL the open/click/unsubscribe links point at
    #[serde(default = "default_tracking_base_url")]
    pub base_url: String,

    /// Key used to sign tracking tokens
    #[serde(default = "default_tracking_secret")]
    pub secret: String,

    /// Shared secret for `X-Outreach-Signature` on bounce webhooks
    pub bounce_webhook_secret: Option<String>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            base_url: default_tracking_base_url(),
            secret: default_tracking_secret(),
            bounce_webhook_secret: None,
        }
    }
}

fn default_tracking_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_tracking_secret() -> String {
    "change-me".to_string()
}

/// Channel driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// SMTP command timeout in seconds
    #[serde(default = "default_smtp_timeout")]
    pub smtp_timeout_secs: u64,

    /// Base URL of the LinkedIn automation driver
    pub linkedin_driver_url: Option<String>,

    /// Request timeout for the automation driver
    #[serde(default = "default_driver_timeout")]
    pub driver_timeout_secs: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            smtp_timeout_secs: default_smtp_timeout(),
            linkedin_driver_url: None,
            driver_timeout_secs: default_driver_timeout(),
        }
    }
}

fn default_smtp_timeout() -> u64 {
    30
}

fn default_driver_timeout() -> u64 {
    60
}

impl Config {
    /// Parse configuration from a TOML document
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from files and `OUTREACH__*` environment overrides
    pub fn load() -> crate::Result<Self> {
        let mut paths = vec![
            PathBuf::from("./outreach.toml"),
            PathBuf::from("/etc/outreach/outreach.toml"),
        ];
        if let Ok(explicit) = std::env::var(CONFIG_PATH_ENV) {
            paths.insert(0, PathBuf::from(explicit));
        }

        let mut builder = config::Config::builder();
        // First existing file wins
        if let Some(path) = paths.into_iter().find(|p| p.exists()) {
            tracing::info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Toml),
            );
        }

        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize::<Config>())
            .map_err(|e| crate::Error::Config(format!("Failed to load config: {}", e)))
    }
}
