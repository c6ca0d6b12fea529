//! Upstream telemetry/control collaborators
//!
//! The coordinator never talks to the network directly. Measurements, the
//! edge node directory and metrics reporting are reached through three
//! traits so the concrete backend is swappable:
//!
//! - [`NetworkProbe`] - link status, latency and bandwidth measurement
//! - [`NodeDirectory`] - edge node discovery, health checks, connections
//! - [`MetricsReporter`] - per-session metrics reports
//!
//! [`ApiClient`] implements all three over the REST API and
//! [`SimulatedBackend`] implements them in-process for demos.

pub mod client;
pub mod simulated;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::edge::{EdgeNode, EdgeNodeMetrics};
use crate::metrics::SessionMetrics;

pub use client::{ApiClient, ApiResponse, ClientConfig, ClientError};
pub use simulated::{SimulatedBackend, SimulationProfile};

/// Link-layer status reported by the probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkStatus {
    /// Whether the device currently has a link
    pub connected: bool,

    /// Signal strength in dBm
    #[serde(default)]
    pub signal_strength: i32,
}

/// Measures the current network link
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    /// Fetch the current link status
    async fn link_status(&self) -> Result<LinkStatus, ClientError>;

    /// Measure round-trip latency in milliseconds
    async fn measure_latency(&self) -> Result<f64, ClientError>;

    /// Measure available bandwidth in Mbps
    async fn measure_bandwidth(&self) -> Result<f64, ClientError>;
}

/// Directory of edge nodes plus per-node health operations
#[async_trait]
pub trait NodeDirectory: Send + Sync {
    /// Fetch the full list of known edge nodes
    async fn fetch_nodes(&self) -> Result<Vec<EdgeNode>, ClientError>;

    /// Check a single node and return its round-trip time in milliseconds
    async fn check_node(&self, node: &EdgeNode) -> Result<f64, ClientError>;

    /// Report the health record of a node back to the directory
    async fn report_node_health(&self, _metrics: &EdgeNodeMetrics) -> Result<(), ClientError> {
        Ok(())
    }

    /// Open a connection to a node
    async fn connect_node(&self, _node_id: &str) -> Result<(), ClientError> {
        Ok(())
    }
}

/// Sink for per-session metrics reports
#[async_trait]
pub trait MetricsReporter: Send + Sync {
    /// Push the current metrics of one session
    async fn report_session(&self, metrics: &SessionMetrics) -> Result<(), ClientError>;
}

/// Reporter that drops every report, used when no upstream is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

#[async_trait]
impl MetricsReporter for NoopReporter {
    async fn report_session(&self, _metrics: &SessionMetrics) -> Result<(), ClientError> {
        Ok(())
    }
}

/// Run one collaborator call bounded by `timeout`
///
/// Elapsed time maps to [`Error::Timeout`](crate::Error::Timeout) and a
/// collaborator failure to [`Error::Upstream`](crate::Error::Upstream).
pub async fn call_with_timeout<T, F>(
    operation: &'static str,
    timeout: std::time::Duration,
    call: F,
) -> crate::Result<T>
where
    F: std::future::Future<Output = Result<T, ClientError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(crate::Error::upstream(operation, e)),
        Err(_) => Err(crate::Error::timeout(operation, timeout)),
    }
}
