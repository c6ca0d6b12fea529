//! In-process simulated backend
//!
//! Produces jittered measurements around a [`SimulationProfile`] and serves a
//! fixed node directory. Used by the CLI `--simulate` mode and demos.

use async_trait::async_trait;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{ClientError, LinkStatus, MetricsReporter, NetworkProbe, NodeDirectory};
use crate::edge::{EdgeNode, EdgeNodeMetrics, EdgeNodeStatus};
use crate::metrics::SessionMetrics;

/// Parameters of the simulated network
#[derive(Debug, Clone)]
pub struct SimulationProfile {
    /// Mean latency in milliseconds
    pub base_latency_ms: f64,

    /// Maximum latency deviation (+/-) in milliseconds
    pub latency_jitter_ms: f64,

    /// Mean bandwidth in Mbps
    pub base_bandwidth_mbps: f64,

    /// Maximum bandwidth deviation (+/-) in Mbps
    pub bandwidth_jitter_mbps: f64,

    /// Probability (0.0-1.0) that any single call fails
    pub failure_rate: f64,

    /// Signal strength reported by the link query (dBm)
    pub signal_strength: i32,

    /// Node directory contents
    pub nodes: Vec<EdgeNode>,
}

impl SimulationProfile {
    /// Low-latency, high-bandwidth 5G cell
    pub fn urban_5g() -> Self {
        Self {
            base_latency_ms: 18.0,
            latency_jitter_ms: 6.0,
            base_bandwidth_mbps: 120.0,
            bandwidth_jitter_mbps: 40.0,
            failure_rate: 0.02,
            signal_strength: -72,
            nodes: default_nodes(),
        }
    }

    /// Loaded cell with long tails and occasional failures
    pub fn congested() -> Self {
        Self {
            base_latency_ms: 140.0,
            latency_jitter_ms: 80.0,
            base_bandwidth_mbps: 6.0,
            bandwidth_jitter_mbps: 4.0,
            failure_rate: 0.1,
            signal_strength: -101,
            nodes: default_nodes(),
        }
    }
}

impl Default for SimulationProfile {
    fn default() -> Self {
        Self::urban_5g()
    }
}

fn default_nodes() -> Vec<EdgeNode> {
    vec![
        EdgeNode::new("edge-use1-a", "us-east", "https://use1-a.edge.local")
            .with_country("US")
            .with_latency(22.0)
            .with_capacity(1_000, 620),
        EdgeNode::new("edge-euw1-a", "eu-west", "https://euw1-a.edge.local")
            .with_country("IE")
            .with_latency(35.0)
            .with_capacity(800, 500),
        EdgeNode::new("edge-apne1-a", "ap-northeast", "https://apne1-a.edge.local")
            .with_country("KR")
            .with_latency(12.0)
            .with_capacity(1_200, 300),
        EdgeNode::new("edge-apne1-b", "ap-northeast", "https://apne1-b.edge.local")
            .with_country("JP")
            .with_latency(28.0)
            .with_capacity(600, 0)
            .with_status(EdgeNodeStatus::Degraded),
    ]
}

/// Randomised backend implementing every collaborator trait
pub struct SimulatedBackend {
    profile: SimulationProfile,
    reports: AtomicU64,
}

impl SimulatedBackend {
    /// Create a backend for `profile`
    pub fn new(profile: SimulationProfile) -> Self {
        Self {
            profile,
            reports: AtomicU64::new(0),
        }
    }

    /// Number of session reports received so far
    pub fn reports_received(&self) -> u64 {
        self.reports.load(Ordering::Relaxed)
    }

    fn maybe_fail(&self, operation: &str) -> Result<(), ClientError> {
        if self.profile.failure_rate > 0.0 && rand::thread_rng().gen_bool(self.profile.failure_rate.min(1.0)) {
            return Err(ClientError::NetworkError(format!("simulated {operation} failure")));
        }
        Ok(())
    }

    fn jitter(base: f64, spread: f64, floor: f64) -> f64 {
        if spread <= 0.0 {
            return base.max(floor);
        }
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        (base + offset).max(floor)
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new(SimulationProfile::default())
    }
}

#[async_trait]
impl NetworkProbe for SimulatedBackend {
    async fn link_status(&self) -> Result<LinkStatus, ClientError> {
        self.maybe_fail("link status")?;
        Ok(LinkStatus {
            connected: true,
            signal_strength: self.profile.signal_strength,
        })
    }

    async fn measure_latency(&self) -> Result<f64, ClientError> {
        self.maybe_fail("latency")?;
        Ok(Self::jitter(
            self.profile.base_latency_ms,
            self.profile.latency_jitter_ms,
            1.0,
        ))
    }

    async fn measure_bandwidth(&self) -> Result<f64, ClientError> {
        self.maybe_fail("bandwidth")?;
        Ok(Self::jitter(
            self.profile.base_bandwidth_mbps,
            self.profile.bandwidth_jitter_mbps,
            0.1,
        ))
    }
}

#[async_trait]
impl NodeDirectory for SimulatedBackend {
    async fn fetch_nodes(&self) -> Result<Vec<EdgeNode>, ClientError> {
        Ok(self.profile.nodes.clone())
    }

    async fn check_node(&self, node: &EdgeNode) -> Result<f64, ClientError> {
        self.maybe_fail("health check")?;
        Ok(Self::jitter(node.latency_ms, self.profile.latency_jitter_ms / 2.0, 1.0))
    }

    async fn report_node_health(&self, metrics: &EdgeNodeMetrics) -> Result<(), ClientError> {
        tracing::trace!(node_id = %metrics.node_id, status = %metrics.status, "Simulated health report");
        Ok(())
    }
}

#[async_trait]
impl MetricsReporter for SimulatedBackend {
    async fn report_session(&self, metrics: &SessionMetrics) -> Result<(), ClientError> {
        self.reports.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(session_id = %metrics.session_id, "Simulated session report");
        Ok(())
    }
}
