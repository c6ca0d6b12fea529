//! Periodic network detection
//!
//! [`NetworkDetector`] measures the link through a [`NetworkProbe`],
//! classifies it and keeps the last successful reading. Measurement failures
//! never surface as errors from [`NetworkDetector::detect_network`]; they are
//! encoded in the returned [`DetectionResult`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use super::{determine_network_type, network_quality_score, NetworkStatus, NetworkType};
use crate::api::{call_with_timeout, NetworkProbe};
use crate::clock::Clock;
use crate::config::{AdapterConfig, ConfigError};
use crate::error::{Error, Result};
use crate::metrics::exporter;
use crate::task::TaskGroup;

const COMPONENT: &str = "network detector";

// ============================================================================
// Configuration
// ============================================================================

/// Detector configuration
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Time between detections
    pub interval: Duration,

    /// Per-probe-call timeout
    pub request_timeout: Duration,

    /// Latency below which a 5G link counts as available (ms)
    pub target_latency_ms: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::from(&AdapterConfig::default())
    }
}

impl From<&AdapterConfig> for DetectorConfig {
    fn from(config: &AdapterConfig) -> Self {
        Self {
            interval: config.detection_interval(),
            request_timeout: config.request_timeout(),
            target_latency_ms: config.target_latency_ms,
        }
    }
}

impl DetectorConfig {
    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::invalid("detection_interval", "must be greater than 0"));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::invalid("request_timeout", "must be greater than 0"));
        }
        if !(self.target_latency_ms > 0.0) {
            return Err(ConfigError::invalid("target_latency_ms", "must be greater than 0"));
        }
        Ok(())
    }
}

// ============================================================================
// Detection Result
// ============================================================================

/// Outcome of one detection cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Measured status (default status when not detected)
    pub status: NetworkStatus,

    /// Whether the cycle produced a usable reading
    pub detected: bool,

    /// Failure description when not detected
    pub error: Option<String>,

    /// Quality score of `status`
    pub quality: u8,

    /// Wall time spent measuring
    pub duration_ms: u64,
}

// ============================================================================
// Network Detector
// ============================================================================

struct DetectorInner {
    config: DetectorConfig,
    probe: Arc<dyn NetworkProbe>,
    clock: Arc<dyn Clock>,
    current: RwLock<Option<NetworkStatus>>,
}

impl DetectorInner {
    async fn measure(&self) -> Result<NetworkStatus> {
        let timeout = self.config.request_timeout;

        let (link, latency, bandwidth) = tokio::join!(
            call_with_timeout("link_status", timeout, self.probe.link_status()),
            call_with_timeout("measure_latency", timeout, self.probe.measure_latency()),
            call_with_timeout("measure_bandwidth", timeout, self.probe.measure_bandwidth()),
        );

        let signal_strength = match link {
            Ok(link) if !link.connected => {
                return Err(Error::other("link reports disconnected"));
            }
            Ok(link) => link.signal_strength,
            Err(e) => {
                tracing::debug!(error = %e, "Link status unavailable, signal strength unknown");
                0
            }
        };

        let latency_ms = latency?;
        let bandwidth_mbps = bandwidth?;

        Ok(NetworkStatus {
            network_type: determine_network_type(latency_ms, bandwidth_mbps),
            latency_ms,
            bandwidth_mbps,
            signal_strength,
            connected: true,
            timestamp: self.clock.now(),
        })
    }

    async fn detect(&self) -> DetectionResult {
        let started = Instant::now();
        let outcome = self.measure().await;
        let elapsed = started.elapsed();
        let duration_ms = elapsed.as_millis() as u64;
        exporter::record_detection(outcome.is_ok(), elapsed.as_secs_f64());

        match outcome {
            Ok(status) => {
                let quality = network_quality_score(&status);
                tracing::debug!(
                    network_type = %status.network_type,
                    latency_ms = status.latency_ms,
                    bandwidth_mbps = status.bandwidth_mbps,
                    quality,
                    "Network detected"
                );
                exporter::update_network(status.latency_ms, status.bandwidth_mbps, quality);
                *self.current.write().await = Some(status.clone());

                DetectionResult {
                    status,
                    detected: true,
                    error: None,
                    quality,
                    duration_ms,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Network detection failed");
                DetectionResult {
                    status: NetworkStatus::default(),
                    detected: false,
                    error: Some(e.to_string()),
                    quality: 0,
                    duration_ms,
                }
            }
        }
    }
}

/// Periodically measures and classifies the network link
pub struct NetworkDetector {
    inner: Arc<DetectorInner>,
    tasks: Mutex<Option<TaskGroup>>,
}

impl NetworkDetector {
    /// Create a stopped detector
    pub fn new(config: DetectorConfig, probe: Arc<dyn NetworkProbe>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(DetectorInner {
                config,
                probe,
                clock,
                current: RwLock::new(None),
            }),
            tasks: Mutex::new(None),
        }
    }

    /// Detector configuration
    pub fn config(&self) -> &DetectorConfig {
        &self.inner.config
    }

    /// Detect once, then keep detecting every interval
    pub async fn start(&self) -> Result<()> {
        self.inner.config.validate()?;

        let mut tasks = self.tasks.lock().await;
        if tasks.is_some() {
            return Err(Error::AlreadyRunning { component: COMPONENT });
        }

        self.inner.detect().await;

        let mut group = TaskGroup::new(COMPONENT);
        let inner = self.inner.clone();
        group.spawn_periodic("detect", self.inner.config.interval, move || {
            let inner = inner.clone();
            async move {
                inner.detect().await;
            }
        });
        *tasks = Some(group);

        tracing::info!(
            interval_secs = self.inner.config.interval.as_secs(),
            "Network detector started"
        );
        Ok(())
    }

    /// Stop the detection loop
    pub async fn stop(&self) -> Result<()> {
        let group = self
            .tasks
            .lock()
            .await
            .take()
            .ok_or(Error::NotRunning { component: COMPONENT })?;

        group.shutdown().await;
        tracing::info!("Network detector stopped");
        Ok(())
    }

    /// Whether the detection loop is running
    pub async fn is_running(&self) -> bool {
        self.tasks.lock().await.is_some()
    }

    /// Run one detection cycle now
    pub async fn detect_network(&self) -> DetectionResult {
        self.inner.detect().await
    }

    /// Copy of the last known status (Unknown/disconnected before any reading)
    pub async fn current_network(&self) -> NetworkStatus {
        self.inner.current.read().await.clone().unwrap_or_default()
    }

    /// Last successful reading, if any
    pub async fn last_reading(&self) -> Option<NetworkStatus> {
        self.inner.current.read().await.clone()
    }

    /// Whether a connected 5G link with latency under target is available
    pub async fn is_5g_available(&self) -> bool {
        let status = self.current_network().await;
        status.network_type == NetworkType::FiveG
            && status.connected
            && status.latency_ms < self.inner.config.target_latency_ms
    }

    /// Quality score (0-100) of the current status
    pub async fn network_quality(&self) -> u8 {
        network_quality_score(&self.current_network().await)
    }
}
