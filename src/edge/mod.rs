//! Edge node registry, health tracking and selection
//!
//! - [`EdgeNode`] - a node as described by the directory
//! - [`EdgeNodeMetrics`] - locally tracked health record per node
//! - [`NodeRegistry`] - ordered registry with the selection algorithm
//! - [`EdgeNodeManager`] - async owner running health checks and discovery

pub mod manager;
pub mod registry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use manager::{EdgeManagerConfig, EdgeNodeManager, HealthCheckSummary};
pub use registry::{NodeRegistry, RegistryStats};

/// Consecutive failed health checks that force a node offline
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Load ratio above which a node counts as hot
pub const HOT_LOAD_RATIO: f64 = 0.8;

/// Load ratio below which a node counts as cold
pub const COLD_LOAD_RATIO: f64 = 0.2;

// ============================================================================
// Node Status
// ============================================================================

/// Operational status of an edge node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EdgeNodeStatus {
    /// Serving traffic
    Online,

    /// Not reachable
    #[default]
    Offline,

    /// Reachable but impaired
    Degraded,

    /// Administratively drained; health checks leave it alone
    Maintenance,
}

impl EdgeNodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Degraded => "degraded",
            Self::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for EdgeNodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Edge Node
// ============================================================================

/// An edge compute node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeNode {
    /// Unique node identifier
    pub id: String,

    /// Region code (e.g. "us-east")
    pub region: String,

    /// ISO country code
    #[serde(default)]
    pub country: String,

    /// Connection endpoint
    pub endpoint: String,

    /// Directory-reported latency in milliseconds
    #[serde(default)]
    pub latency_ms: f64,

    /// Total session capacity
    #[serde(default)]
    pub capacity: u32,

    /// Free session capacity
    #[serde(default)]
    pub available_capacity: u32,

    /// Current status
    #[serde(default)]
    pub status: EdgeNodeStatus,

    /// Time of the last health check
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
}

impl EdgeNode {
    /// Create an online node with no capacity
    pub fn new(id: impl Into<String>, region: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            region: region.into(),
            country: String::new(),
            endpoint: endpoint.into(),
            latency_ms: 0.0,
            capacity: 0,
            available_capacity: 0,
            status: EdgeNodeStatus::Online,
            last_checked: None,
        }
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }

    pub fn with_latency(mut self, latency_ms: f64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_capacity(mut self, capacity: u32, available: u32) -> Self {
        self.capacity = capacity;
        self.available_capacity = available.min(capacity);
        self
    }

    pub fn with_status(mut self, status: EdgeNodeStatus) -> Self {
        self.status = status;
        self
    }

    /// Sessions currently placed on the node
    pub fn current_load(&self) -> u32 {
        self.capacity.saturating_sub(self.available_capacity)
    }

    /// Used fraction of capacity (1.0 for a node without capacity)
    pub fn load_ratio(&self) -> f64 {
        if self.capacity == 0 {
            1.0
        } else {
            self.current_load() as f64 / self.capacity as f64
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == EdgeNodeStatus::Online
    }
}

// ============================================================================
// Node Metrics
// ============================================================================

/// Locally tracked health record of one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeNodeMetrics {
    pub node_id: String,
    pub region: String,
    pub status: EdgeNodeStatus,
    pub consecutive_failures: u32,

    /// Mean round-trip of successful checks (ms)
    pub avg_latency_ms: f64,
    pub successful_checks: u64,
    pub total_checks: u64,
    pub total_failures: u64,

    pub capacity: u32,
    pub current_load: u32,

    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl EdgeNodeMetrics {
    /// Fresh record for a newly discovered node
    pub fn for_node(node: &EdgeNode, now: DateTime<Utc>) -> Self {
        Self {
            node_id: node.id.clone(),
            region: node.region.clone(),
            status: node.status,
            consecutive_failures: 0,
            avg_latency_ms: 0.0,
            successful_checks: 0,
            total_checks: 0,
            total_failures: 0,
            capacity: node.capacity,
            current_load: node.current_load(),
            last_error: None,
            updated_at: now,
        }
    }

    /// Record a successful check taking `rtt_ms`
    pub fn record_success(&mut self, rtt_ms: f64, now: DateTime<Utc>) {
        self.successful_checks += 1;
        self.total_checks += 1;
        self.avg_latency_ms += (rtt_ms - self.avg_latency_ms) / self.successful_checks as f64;
        self.consecutive_failures = 0;
        self.last_error = None;
        self.updated_at = now;
    }

    /// Record a failed check
    pub fn record_failure(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.consecutive_failures += 1;
        self.total_failures += 1;
        self.total_checks += 1;
        self.last_error = Some(error.into());
        self.updated_at = now;
    }

    /// Whether enough consecutive failures accumulated to force offline
    pub fn is_failing(&self) -> bool {
        self.consecutive_failures >= MAX_CONSECUTIVE_FAILURES
    }
}

// ============================================================================
// Selection
// ============================================================================

/// Filters and preferences for node selection
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectionCriteria {
    /// Drop every node that is not online
    pub exclude_offline: bool,

    /// Maximum observed latency (ms)
    pub max_latency_ms: Option<f64>,

    /// Minimum free capacity
    pub min_capacity: Option<u32>,

    /// Region ranked ahead of all others
    pub preferred_region: Option<String>,

    /// Restrict candidates to the preferred region
    pub require_region: bool,
}

impl SelectionCriteria {
    /// Criteria used when starting a session: online nodes under 100ms
    pub fn for_session() -> Self {
        Self {
            exclude_offline: true,
            max_latency_ms: Some(100.0),
            ..Default::default()
        }
    }

    pub fn with_preferred_region(mut self, region: impl Into<String>) -> Self {
        self.preferred_region = Some(region.into());
        self
    }

    pub fn with_min_capacity(mut self, capacity: u32) -> Self {
        self.min_capacity = Some(capacity);
        self
    }

    pub fn require_region(mut self, required: bool) -> Self {
        self.require_region = required;
        self
    }
}

/// Result of a node selection
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSelection {
    /// Best candidate
    pub node: EdgeNode,

    /// Up to two ranked fallbacks
    pub alternatives: Vec<EdgeNode>,
}
