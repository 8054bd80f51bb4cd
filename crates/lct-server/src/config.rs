//! Server configuration loading from file and environment variables.

use lct_queue::{HealthThresholds, RetryPolicy};
use lct_types::{
    DEFAULT_BASE_RETRY_DELAY_SECS, DEFAULT_MAX_RETRY_DELAY_SECS, DEFAULT_OPERATION_MAX_RETRIES,
    DEFAULT_REQUEST_MAX_RETRIES, DEFAULT_SESSION_TTL_SECS, DEFAULT_UNVERIFIED_RETRY_DELAY_SECS,
};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub pairing: PairingConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub presence: PresenceConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "lct_queue=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairingConfig {
    /// Lifetime of a pending pairing session.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: i64,
}

/// Retry budgets, backoff and the scheduled drain.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_request_max_retries")]
    pub request_max_retries: u32,

    #[serde(default = "default_operation_max_retries")]
    pub operation_max_retries: u32,

    #[serde(default = "default_base_retry_delay_secs")]
    pub base_retry_delay_secs: i64,

    #[serde(default = "default_max_retry_delay_secs")]
    pub max_retry_delay_secs: i64,

    #[serde(default = "default_unverified_retry_delay_secs")]
    pub unverified_retry_delay_secs: i64,

    /// Seconds between scheduled drain passes. Zero disables the task.
    #[serde(default = "default_drain_interval_secs")]
    pub drain_interval_secs: u64,

    #[serde(default = "default_critical_failures")]
    pub critical_failures: u32,

    #[serde(default = "default_warning_retries")]
    pub warning_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PresenceConfig {
    /// A component is online while its last heartbeat is this recent.
    #[serde(default = "default_online_window_secs")]
    pub online_window_secs: i64,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_db_path() -> String {
    "lct.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_session_ttl_secs() -> i64 {
    DEFAULT_SESSION_TTL_SECS
}

fn default_request_max_retries() -> u32 {
    DEFAULT_REQUEST_MAX_RETRIES
}

fn default_operation_max_retries() -> u32 {
    DEFAULT_OPERATION_MAX_RETRIES
}

fn default_base_retry_delay_secs() -> i64 {
    DEFAULT_BASE_RETRY_DELAY_SECS
}

fn default_max_retry_delay_secs() -> i64 {
    DEFAULT_MAX_RETRY_DELAY_SECS
}

fn default_unverified_retry_delay_secs() -> i64 {
    DEFAULT_UNVERIFIED_RETRY_DELAY_SECS
}

fn default_drain_interval_secs() -> u64 {
    60
}

fn default_critical_failures() -> u32 {
    1
}

fn default_warning_retries() -> u32 {
    1
}

fn default_online_window_secs() -> i64 {
    120
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            request_max_retries: default_request_max_retries(),
            operation_max_retries: default_operation_max_retries(),
            base_retry_delay_secs: default_base_retry_delay_secs(),
            max_retry_delay_secs: default_max_retry_delay_secs(),
            unverified_retry_delay_secs: default_unverified_retry_delay_secs(),
            drain_interval_secs: default_drain_interval_secs(),
            critical_failures: default_critical_failures(),
            warning_retries: default_warning_retries(),
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            online_window_secs: default_online_window_secs(),
        }
    }
}

impl QueueConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_retry_delay_secs: self.base_retry_delay_secs,
            max_retry_delay_secs: self.max_retry_delay_secs,
            unverified_retry_delay_secs: self.unverified_retry_delay_secs,
            request_max_retries: self.request_max_retries,
            operation_max_retries: self.operation_max_retries,
        }
    }

    pub fn health_thresholds(&self) -> HealthThresholds {
        HealthThresholds {
            critical_failures: self.critical_failures,
            warning_retries: self.warning_retries,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `LCT_HOST` overrides `server.host`
/// - `LCT_PORT` overrides `server.port`
/// - `LCT_DB_PATH` overrides `database.path`
/// - `LCT_LOG_LEVEL` overrides `logging.level`
/// - `LCT_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `LCT_DRAIN_INTERVAL_SECS` overrides `queue.drain_interval_secs`
/// - `LCT_SESSION_TTL_SECS` overrides `pairing.session_ttl_secs`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed, or
/// if a retry, TTL or database setting is out of range.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    if let Ok(host) = std::env::var("LCT_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("LCT_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(db_path) = std::env::var("LCT_DB_PATH") {
        config.database.path = db_path;
    }
    if let Ok(level) = std::env::var("LCT_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("LCT_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Ok(interval) = std::env::var("LCT_DRAIN_INTERVAL_SECS") {
        if let Ok(parsed) = interval.parse() {
            config.queue.drain_interval_secs = parsed;
        }
    }
    if let Ok(ttl) = std::env::var("LCT_SESSION_TTL_SECS") {
        if let Ok(parsed) = ttl.parse() {
            config.pairing.session_ttl_secs = parsed;
        }
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.pairing.session_ttl_secs <= 0 {
        return Err(ConfigError::Invalid(
            "pairing.session_ttl_secs must be positive".to_string(),
        ));
    }
    let q = &config.queue;
    if q.base_retry_delay_secs <= 0 || q.max_retry_delay_secs < q.base_retry_delay_secs {
        return Err(ConfigError::Invalid(
            "queue retry delays must satisfy 0 < base_retry_delay_secs <= max_retry_delay_secs"
                .to_string(),
        ));
    }
    if q.unverified_retry_delay_secs <= 0 {
        return Err(ConfigError::Invalid(
            "queue.unverified_retry_delay_secs must be positive".to_string(),
        ));
    }
    if config.presence.online_window_secs < 0 {
        return Err(ConfigError::Invalid(
            "presence.online_window_secs must not be negative".to_string(),
        ));
    }
    if lct_db::is_unshared_path(&config.database.path) {
        return Err(ConfigError::Invalid(format!(
            "database.path {:?} must name a database file",
            config.database.path
        )));
    }
    if config.database.pool_max_size == 0 {
        return Err(ConfigError::Invalid(
            "database.pool_max_size must be at least 1".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config(Some("/nonexistent/lct-config.toml")).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.pairing.session_ttl_secs, 300);
        assert_eq!(config.queue.retry_policy(), RetryPolicy::default());
        assert_eq!(config.queue.health_thresholds(), HealthThresholds::default());
    }

    #[test]
    fn partial_file_keeps_defaults_for_other_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[queue]\nbase_retry_delay_secs = 10\nmax_retry_delay_secs = 80\n\n[presence]\nonline_window_secs = 30"
        )
        .unwrap();

        let config = load_config(file.path().to_str()).unwrap();
        let policy = config.queue.retry_policy();
        assert_eq!(policy.base_retry_delay_secs, 10);
        assert_eq!(policy.max_retry_delay_secs, 80);
        assert_eq!(policy.operation_max_retries, 5);
        assert_eq!(config.presence.online_window_secs, 30);
        assert_eq!(config.database.pool_max_size, 8);
    }

    #[test]
    fn rejects_inverted_retry_delays() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[queue]\nbase_retry_delay_secs = 600\nmax_retry_delay_secs = 300"
        )
        .unwrap();
        assert!(matches!(
            load_config(file.path().to_str()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_in_memory_database_and_empty_pool() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[database]\npath = \":memory:\"").unwrap();
        assert!(matches!(
            load_config(file.path().to_str()),
            Err(ConfigError::Invalid(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[database]\npool_max_size = 0").unwrap();
        assert!(matches!(
            load_config(file.path().to_str()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nport = ").unwrap();
        assert!(matches!(
            load_config(file.path().to_str()),
            Err(ConfigError::Parse(_))
        ));
    }
}
