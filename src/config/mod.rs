//! Configuration management for edgepulse
//!
//! [`AdapterConfig`] carries every recognised option with sane defaults. It
//! can be built in code via [`AdapterConfig::builder`], loaded from a TOML
//! file with [`AdapterConfig::from_file`], or read from `EDGEPULSE_*`
//! environment variables with [`AdapterConfig::from_env`]. Missing fields
//! always fall back to the defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdapterConfig {
    /// Base URL of the telemetry/control REST API
    pub api_base_url: String,

    /// Interval between network detections
    pub detection_interval_secs: u64,

    /// Interval between edge node health check rounds
    pub health_check_interval_secs: u64,

    /// Interval between full edge node re-discovery
    pub discovery_interval_secs: u64,

    /// Interval between metrics aggregation/report ticks
    pub metrics_report_interval_secs: u64,

    /// Interval of the adapter status/warning monitor
    pub status_interval_secs: u64,

    /// Per-call timeout for measurements and reports
    pub request_timeout_ms: u64,

    /// Per-node health check timeout
    pub health_check_timeout_ms: u64,

    /// Maximum concurrent edge node connections
    pub max_edge_connections: usize,

    /// Enable per-session metrics collection
    pub enable_metrics_collection: bool,

    /// Let the monitor loop adapt quality automatically
    pub enable_auto_quality: bool,

    /// Target latency in milliseconds
    pub target_latency_ms: f64,

    /// Target bandwidth in Mbps
    pub target_bandwidth_mbps: f64,

    /// Network quality score change (0-100 points) that triggers automatic
    /// re-adaptation
    pub quality_switch_threshold: f64,

    /// Minimum time between two adaptive quality changes
    pub quality_debounce_ms: u64,

    /// Maximum retained quality adjustments
    pub quality_history_size: usize,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            api_base_url: String::from("http://localhost:8080"),
            detection_interval_secs: 10,
            health_check_interval_secs: 30,
            discovery_interval_secs: 300,
            metrics_report_interval_secs: 15,
            status_interval_secs: 5,
            request_timeout_ms: 5_000,
            health_check_timeout_ms: 2_000,
            max_edge_connections: 10,
            enable_metrics_collection: true,
            enable_auto_quality: true,
            target_latency_ms: 50.0,
            target_bandwidth_mbps: 10.0,
            quality_switch_threshold: 10.0,
            quality_debounce_ms: 2_000,
            quality_history_size: 50,
            logging: LoggingConfig::default(),
        }
    }
}

impl AdapterConfig {
    /// Create a new config builder
    pub fn builder() -> AdapterConfigBuilder {
        AdapterConfigBuilder::default()
    }

    /// Load configuration from `EDGEPULSE_*` environment variables
    ///
    /// Unset or unparsable variables keep their default value.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            api_base_url: std::env::var("EDGEPULSE_API_URL").unwrap_or(defaults.api_base_url),
            detection_interval_secs: env_parse("EDGEPULSE_DETECTION_INTERVAL")
                .unwrap_or(defaults.detection_interval_secs),
            health_check_interval_secs: env_parse("EDGEPULSE_HEALTH_CHECK_INTERVAL")
                .unwrap_or(defaults.health_check_interval_secs),
            discovery_interval_secs: env_parse("EDGEPULSE_DISCOVERY_INTERVAL")
                .unwrap_or(defaults.discovery_interval_secs),
            metrics_report_interval_secs: env_parse("EDGEPULSE_METRICS_REPORT_INTERVAL")
                .unwrap_or(defaults.metrics_report_interval_secs),
            status_interval_secs: env_parse("EDGEPULSE_STATUS_INTERVAL")
                .unwrap_or(defaults.status_interval_secs),
            request_timeout_ms: env_parse("EDGEPULSE_REQUEST_TIMEOUT_MS")
                .unwrap_or(defaults.request_timeout_ms),
            health_check_timeout_ms: env_parse("EDGEPULSE_HEALTH_CHECK_TIMEOUT_MS")
                .unwrap_or(defaults.health_check_timeout_ms),
            max_edge_connections: env_parse("EDGEPULSE_MAX_EDGE_CONNECTIONS")
                .unwrap_or(defaults.max_edge_connections),
            enable_metrics_collection: env_parse("EDGEPULSE_ENABLE_METRICS")
                .unwrap_or(defaults.enable_metrics_collection),
            enable_auto_quality: env_parse("EDGEPULSE_AUTO_QUALITY")
                .unwrap_or(defaults.enable_auto_quality),
            target_latency_ms: env_parse("EDGEPULSE_TARGET_LATENCY_MS")
                .unwrap_or(defaults.target_latency_ms),
            target_bandwidth_mbps: env_parse("EDGEPULSE_TARGET_BANDWIDTH_MBPS")
                .unwrap_or(defaults.target_bandwidth_mbps),
            quality_switch_threshold: env_parse("EDGEPULSE_QUALITY_SWITCH_THRESHOLD")
                .unwrap_or(defaults.quality_switch_threshold),
            quality_debounce_ms: env_parse("EDGEPULSE_QUALITY_DEBOUNCE_MS")
                .unwrap_or(defaults.quality_debounce_ms),
            quality_history_size: env_parse("EDGEPULSE_QUALITY_HISTORY_SIZE")
                .unwrap_or(defaults.quality_history_size),
            logging: LoggingConfig {
                level: std::env::var("EDGEPULSE_LOG_LEVEL").unwrap_or(defaults.logging.level),
                format: std::env::var("EDGEPULSE_LOG_FORMAT").unwrap_or(defaults.logging.format),
            },
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Err(e) = url::Url::parse(&self.api_base_url) {
            return Err(ConfigError::invalid("api_base_url", e.to_string()));
        }

        let intervals = [
            ("detection_interval_secs", self.detection_interval_secs),
            ("health_check_interval_secs", self.health_check_interval_secs),
            ("discovery_interval_secs", self.discovery_interval_secs),
            ("metrics_report_interval_secs", self.metrics_report_interval_secs),
            ("status_interval_secs", self.status_interval_secs),
            ("request_timeout_ms", self.request_timeout_ms),
            ("health_check_timeout_ms", self.health_check_timeout_ms),
        ];
        for (field, value) in intervals {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be greater than 0"));
            }
        }

        if self.discovery_interval_secs < self.health_check_interval_secs {
            return Err(ConfigError::invalid(
                "discovery_interval_secs",
                "re-discovery must not run more often than health checks",
            ));
        }

        if self.max_edge_connections == 0 {
            return Err(ConfigError::invalid(
                "max_edge_connections",
                "must allow at least 1 connection",
            ));
        }

        if !(self.target_latency_ms > 0.0) {
            return Err(ConfigError::invalid("target_latency_ms", "must be positive"));
        }

        if !(self.target_bandwidth_mbps > 0.0) {
            return Err(ConfigError::invalid("target_bandwidth_mbps", "must be positive"));
        }

        if !(0.0..=100.0).contains(&self.quality_switch_threshold) {
            return Err(ConfigError::invalid(
                "quality_switch_threshold",
                "must be within 0-100 score points",
            ));
        }

        if self.quality_history_size == 0 {
            return Err(ConfigError::invalid("quality_history_size", "must be greater than 0"));
        }

        Ok(())
    }

    /// Detection interval as Duration
    pub fn detection_interval(&self) -> Duration {
        Duration::from_secs(self.detection_interval_secs)
    }

    /// Health check interval as Duration
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    /// Re-discovery interval as Duration
    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_interval_secs)
    }

    /// Metrics report interval as Duration
    pub fn metrics_report_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_report_interval_secs)
    }

    /// Status monitor interval as Duration
    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }

    /// Request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Health check timeout as Duration
    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_millis(self.health_check_timeout_ms)
    }

    /// Quality debounce window as Duration
    pub fn quality_debounce(&self) -> Duration {
        Duration::from_millis(self.quality_debounce_ms)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

/// Builder for AdapterConfig
#[derive(Debug, Default)]
pub struct AdapterConfigBuilder {
    config: Option<AdapterConfig>,
}

impl AdapterConfigBuilder {
    fn config(&mut self) -> &mut AdapterConfig {
        self.config.get_or_insert_with(AdapterConfig::default)
    }

    /// Set the API base URL
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config().api_base_url = url.into();
        self
    }

    /// Set detection interval
    pub fn detection_interval_secs(mut self, secs: u64) -> Self {
        self.config().detection_interval_secs = secs;
        self
    }

    /// Set health check interval
    pub fn health_check_interval_secs(mut self, secs: u64) -> Self {
        self.config().health_check_interval_secs = secs;
        self
    }

    /// Set re-discovery interval
    pub fn discovery_interval_secs(mut self, secs: u64) -> Self {
        self.config().discovery_interval_secs = secs;
        self
    }

    /// Set metrics report interval
    pub fn metrics_report_interval_secs(mut self, secs: u64) -> Self {
        self.config().metrics_report_interval_secs = secs;
        self
    }

    /// Set status monitor interval
    pub fn status_interval_secs(mut self, secs: u64) -> Self {
        self.config().status_interval_secs = secs;
        self
    }

    /// Set per-call request timeout
    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config().request_timeout_ms = ms;
        self
    }

    /// Set per-node health check timeout
    pub fn health_check_timeout_ms(mut self, ms: u64) -> Self {
        self.config().health_check_timeout_ms = ms;
        self
    }

    /// Set max concurrent edge connections
    pub fn max_edge_connections(mut self, max: usize) -> Self {
        self.config().max_edge_connections = max;
        self
    }

    /// Enable/disable metrics collection
    pub fn enable_metrics_collection(mut self, enable: bool) -> Self {
        self.config().enable_metrics_collection = enable;
        self
    }

    /// Enable/disable automatic quality adaptation
    pub fn enable_auto_quality(mut self, enable: bool) -> Self {
        self.config().enable_auto_quality = enable;
        self
    }

    /// Set target latency
    pub fn target_latency_ms(mut self, ms: f64) -> Self {
        self.config().target_latency_ms = ms;
        self
    }

    /// Set target bandwidth
    pub fn target_bandwidth_mbps(mut self, mbps: f64) -> Self {
        self.config().target_bandwidth_mbps = mbps;
        self
    }

    /// Set quality switch sensitivity
    pub fn quality_switch_threshold(mut self, points: f64) -> Self {
        self.config().quality_switch_threshold = points;
        self
    }

    /// Set quality debounce window
    pub fn quality_debounce_ms(mut self, ms: u64) -> Self {
        self.config().quality_debounce_ms = ms;
        self
    }

    /// Set logging configuration
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.config().logging = logging;
        self
    }

    /// Build and validate the config
    pub fn build(self) -> Result<AdapterConfig, ConfigError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors
#[derive(Debug, Clone)]
pub enum ConfigError {
    InvalidValue { field: String, reason: String },
    MissingField { field: String },
    Io { path: String, reason: String },
    Parse { path: String, reason: String },
}

impl ConfigError {
    /// Create an invalid value error
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
            Self::MissingField { field } => {
                write!(f, "Missing required field: {}", field)
            }
            Self::Io { path, reason } => {
                write!(f, "Failed to read config file {}: {}", path, reason)
            }
            Self::Parse { path, reason } => {
                write!(f, "Failed to parse TOML config file {}: {}", path, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
