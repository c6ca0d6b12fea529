//! Composite status snapshots, warnings and adapter events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::session::SessionContext;
use crate::config::AdapterConfig;
use crate::edge::RegistryStats;
use crate::metrics::{GlobalMetrics, SessionMetrics};
use crate::network::NetworkStatus;
use crate::quality::{QualityLevel, QualityProfile};

/// Session average packet loss (%) above which a warning is raised
pub const PACKET_LOSS_WARNING_PERCENT: f64 = 5.0;

// ============================================================================
// Status
// ============================================================================

/// Running state of each subordinate component
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentStates {
    pub detector: bool,
    pub edge_manager: bool,
    pub metrics_collector: bool,
    pub monitor: bool,
}

/// Point-in-time snapshot of the whole adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterStatus {
    pub started: bool,
    pub healthy: bool,
    pub components: ComponentStates,

    pub network: NetworkStatus,
    pub has_network_reading: bool,
    pub network_quality: u8,
    pub is_5g_available: bool,

    pub edge: RegistryStats,
    pub region_online_counts: BTreeMap<String, usize>,

    pub quality_level: QualityLevel,
    pub quality_profile: Option<QualityProfile>,

    pub session: Option<SessionContext>,
    pub session_metrics: Option<SessionMetrics>,
    pub global_metrics: Option<GlobalMetrics>,

    pub timestamp: DateTime<Utc>,
}

impl AdapterStatus {
    /// One-line human summary
    pub fn summary(&self) -> String {
        let session = self
            .session
            .as_ref()
            .map(|s| format!("session {} on {}", s.session_id, s.edge_node_id))
            .unwrap_or_else(|| "no session".to_string());

        format!(
            "{} | {} {:.0}ms {:.1}Mbps q={} | nodes {}/{} online | quality {} | {}",
            if self.healthy { "healthy" } else { "unhealthy" },
            self.network.network_type,
            self.network.latency_ms,
            self.network.bandwidth_mbps,
            self.network_quality,
            self.edge.online,
            self.edge.total_nodes,
            self.quality_level,
            session
        )
    }
}

// ============================================================================
// Warnings
// ============================================================================

/// Category of an advisory warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    HighLatency,
    LowBandwidth,
    HighPacketLoss,
    NoEdgeNode,
    EdgeConnectionFailed,
}

impl WarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighLatency => "high_latency",
            Self::LowBandwidth => "low_bandwidth",
            Self::HighPacketLoss => "high_packet_loss",
            Self::NoEdgeNode => "no_edge_node",
            Self::EdgeConnectionFailed => "edge_connection_failed",
        }
    }
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Advisory warning; never changes adapter state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterWarning {
    pub kind: WarningKind,
    pub message: String,
    pub value: Option<f64>,
    pub threshold: Option<f64>,
    pub session_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AdapterWarning {
    pub fn new(kind: WarningKind, message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            message: message.into(),
            value: None,
            threshold: None,
            session_id: None,
            timestamp,
        }
    }

    pub fn with_measurement(mut self, value: f64, threshold: f64) -> Self {
        self.value = Some(value);
        self.threshold = Some(threshold);
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Threshold warnings for the current network reading and session
pub fn evaluate_warnings(
    config: &AdapterConfig,
    reading: Option<&NetworkStatus>,
    session: Option<&SessionMetrics>,
    now: DateTime<Utc>,
) -> Vec<AdapterWarning> {
    let mut warnings = Vec::new();

    if let Some(status) = reading.filter(|s| s.connected) {
        if status.latency_ms > config.target_latency_ms {
            warnings.push(
                AdapterWarning::new(
                    WarningKind::HighLatency,
                    format!(
                        "Latency {:.1}ms exceeds target {:.1}ms",
                        status.latency_ms, config.target_latency_ms
                    ),
                    now,
                )
                .with_measurement(status.latency_ms, config.target_latency_ms),
            );
        }

        if status.bandwidth_mbps < config.target_bandwidth_mbps {
            warnings.push(
                AdapterWarning::new(
                    WarningKind::LowBandwidth,
                    format!(
                        "Bandwidth {:.1}Mbps below target {:.1}Mbps",
                        status.bandwidth_mbps, config.target_bandwidth_mbps
                    ),
                    now,
                )
                .with_measurement(status.bandwidth_mbps, config.target_bandwidth_mbps),
            );
        }
    }

    if let Some(metrics) = session {
        let loss = &metrics.packet_loss;
        if !loss.is_empty() && loss.avg > PACKET_LOSS_WARNING_PERCENT {
            warnings.push(
                AdapterWarning::new(
                    WarningKind::HighPacketLoss,
                    format!("Packet loss {:.1}% above {:.0}%", loss.avg, PACKET_LOSS_WARNING_PERCENT),
                    now,
                )
                .with_measurement(loss.avg, PACKET_LOSS_WARNING_PERCENT)
                .with_session(metrics.session_id.clone()),
            );
        }
    }

    warnings
}

// ============================================================================
// Events
// ============================================================================

/// Events broadcast to adapter subscribers
#[derive(Debug, Clone)]
pub enum AdapterEvent {
    Started,
    Stopped,
    SessionStarted(SessionContext),
    SessionEnded {
        session_id: String,
        metrics: Option<SessionMetrics>,
    },
    QualityChanged {
        from: QualityLevel,
        to: QualityLevel,
    },
    Warning(AdapterWarning),
    Status(Box<AdapterStatus>),
}
