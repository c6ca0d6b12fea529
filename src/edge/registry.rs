//! Ordered node registry and the selection algorithm
//!
//! [`NodeRegistry`] is plain data; [`EdgeNodeManager`](super::EdgeNodeManager)
//! keeps it behind a `RwLock` and hands out clones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::{
    EdgeNode, EdgeNodeMetrics, EdgeNodeStatus, NodeSelection, SelectionCriteria, COLD_LOAD_RATIO,
    HOT_LOAD_RATIO,
};
use crate::error::{Error, Result};

/// Fallback candidates returned next to the selected node
const MAX_ALTERNATIVES: usize = 2;

// ============================================================================
// Node Registry
// ============================================================================

#[derive(Debug, Clone)]
struct NodeEntry {
    node: EdgeNode,
    metrics: EdgeNodeMetrics,
}

impl NodeEntry {
    fn observed_latency(&self) -> f64 {
        if self.metrics.successful_checks > 0 {
            self.metrics.avg_latency_ms
        } else {
            self.node.latency_ms
        }
    }

    fn sync_metrics(&mut self) {
        self.metrics.status = self.node.status;
        self.metrics.region.clone_from(&self.node.region);
        self.metrics.capacity = self.node.capacity;
        self.metrics.current_load = self.node.current_load();
    }
}

/// Registry of known edge nodes keyed (and iterated) by node id
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    entries: BTreeMap<String, NodeEntry>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace the node set with a fresh directory listing
    ///
    /// Health records of nodes that are still listed survive; a node whose
    /// record shows too many consecutive failures stays offline.
    pub fn replace_all(&mut self, nodes: Vec<EdgeNode>, now: DateTime<Utc>) {
        let mut previous = std::mem::take(&mut self.entries);

        for mut node in nodes {
            let metrics = match previous.remove(&node.id) {
                Some(old) => {
                    if old.metrics.is_failing() && node.status != EdgeNodeStatus::Maintenance {
                        node.status = EdgeNodeStatus::Offline;
                    }
                    node.last_checked = node.last_checked.or(old.node.last_checked);
                    old.metrics
                }
                None => EdgeNodeMetrics::for_node(&node, now),
            };

            let mut entry = NodeEntry { node, metrics };
            entry.sync_metrics();
            self.entries.insert(entry.node.id.clone(), entry);
        }
    }

    pub fn get(&self, id: &str) -> Option<EdgeNode> {
        self.entries.get(id).map(|e| e.node.clone())
    }

    pub fn metrics(&self, id: &str) -> Option<EdgeNodeMetrics> {
        self.entries.get(id).map(|e| e.metrics.clone())
    }

    pub fn all_metrics(&self) -> Vec<EdgeNodeMetrics> {
        self.entries.values().map(|e| e.metrics.clone()).collect()
    }

    /// All nodes ordered by id
    pub fn nodes(&self) -> Vec<EdgeNode> {
        self.entries.values().map(|e| e.node.clone()).collect()
    }

    /// Observed latency: mean of successful checks, else directory latency
    pub fn observed_latency(&self, id: &str) -> Option<f64> {
        self.entries.get(id).map(NodeEntry::observed_latency)
    }

    /// Nodes a health round should probe (everything not in maintenance)
    pub fn checkable_nodes(&self) -> Vec<EdgeNode> {
        self.entries
            .values()
            .filter(|e| e.node.status != EdgeNodeStatus::Maintenance)
            .map(|e| e.node.clone())
            .collect()
    }

    // ------------------------------------------------------------------------
    // Health updates
    // ------------------------------------------------------------------------

    /// Apply a successful health check
    pub fn record_check_success(&mut self, id: &str, rtt_ms: f64, now: DateTime<Utc>) -> Result<EdgeNodeMetrics> {
        let entry = self.entry_mut(id)?;

        entry.metrics.record_success(rtt_ms, now);
        entry.node.last_checked = Some(now);
        if matches!(entry.node.status, EdgeNodeStatus::Offline | EdgeNodeStatus::Degraded) {
            tracing::info!(node_id = %id, previous = %entry.node.status, "Edge node back online");
            entry.node.status = EdgeNodeStatus::Online;
        }
        entry.sync_metrics();

        Ok(entry.metrics.clone())
    }

    /// Apply a failed health check
    pub fn record_check_failure(
        &mut self,
        id: &str,
        error: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<EdgeNodeMetrics> {
        let entry = self.entry_mut(id)?;

        entry.metrics.record_failure(error, now);
        entry.node.last_checked = Some(now);
        if entry.metrics.is_failing() && entry.node.status != EdgeNodeStatus::Offline {
            tracing::warn!(
                node_id = %id,
                failures = entry.metrics.consecutive_failures,
                "Edge node marked offline"
            );
            entry.node.status = EdgeNodeStatus::Offline;
        }
        entry.sync_metrics();

        Ok(entry.metrics.clone())
    }

    /// Update the load snapshot of a node
    pub fn report_load(&mut self, id: &str, current_load: u32, capacity: u32, now: DateTime<Utc>) -> Result<EdgeNode> {
        let entry = self.entry_mut(id)?;

        entry.node.capacity = capacity;
        entry.node.available_capacity = capacity.saturating_sub(current_load);
        entry.metrics.updated_at = now;
        entry.sync_metrics();

        Ok(entry.node.clone())
    }

    fn entry_mut(&mut self, id: &str) -> Result<&mut NodeEntry> {
        self.entries
            .get_mut(id)
            .ok_or_else(|| Error::NodeNotFound(id.to_string()))
    }

    // ------------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------------

    /// Pick the best node for `criteria` plus up to two ranked alternates
    pub fn select(&self, criteria: &SelectionCriteria) -> Result<NodeSelection> {
        if self.entries.is_empty() {
            return Err(Error::NoNodes);
        }

        let preferred = criteria.preferred_region.as_deref();

        let mut candidates: Vec<(&NodeEntry, f64)> = self
            .entries
            .values()
            .filter(|e| !criteria.exclude_offline || e.node.is_online())
            .map(|e| (e, e.observed_latency()))
            .filter(|(_, latency)| criteria.max_latency_ms.map_or(true, |max| *latency <= max))
            .filter(|(e, _)| {
                criteria
                    .min_capacity
                    .map_or(true, |min| e.node.available_capacity >= min)
            })
            .filter(|(e, _)| match (criteria.require_region, preferred) {
                (true, Some(region)) => e.node.region == region,
                _ => true,
            })
            .collect();

        if candidates.is_empty() {
            return Err(Error::NoSuitableNodes);
        }

        candidates.sort_by(|(a, a_latency), (b, b_latency)| {
            let a_match = preferred.is_some_and(|r| a.node.region == r);
            let b_match = preferred.is_some_and(|r| b.node.region == r);

            b_match
                .cmp(&a_match)
                .then_with(|| a_latency.total_cmp(b_latency))
                .then_with(|| {
                    a.node
                        .load_ratio()
                        .partial_cmp(&b.node.load_ratio())
                        .unwrap_or(Ordering::Equal)
                })
        });

        let mut ranked = candidates.into_iter().map(|(e, _)| e.node.clone());
        let node = ranked.next().ok_or(Error::NoSuitableNodes)?;
        let alternatives = ranked.take(MAX_ALTERNATIVES).collect();

        Ok(NodeSelection { node, alternatives })
    }

    // ------------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------------

    /// Nodes by ascending load ratio
    pub fn by_load(&self) -> Vec<EdgeNode> {
        let mut nodes = self.nodes();
        nodes.sort_by(|a, b| a.load_ratio().total_cmp(&b.load_ratio()));
        nodes
    }

    /// Nodes by ascending observed latency
    pub fn by_latency(&self) -> Vec<EdgeNode> {
        let mut entries: Vec<&NodeEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| a.observed_latency().total_cmp(&b.observed_latency()));
        entries.into_iter().map(|e| e.node.clone()).collect()
    }

    /// Nodes above 80% load
    pub fn hot_nodes(&self) -> Vec<EdgeNode> {
        self.entries
            .values()
            .filter(|e| e.node.load_ratio() > HOT_LOAD_RATIO)
            .map(|e| e.node.clone())
            .collect()
    }

    /// Nodes below 20% load
    pub fn cold_nodes(&self) -> Vec<EdgeNode> {
        self.entries
            .values()
            .filter(|e| e.node.load_ratio() < COLD_LOAD_RATIO)
            .map(|e| e.node.clone())
            .collect()
    }

    /// Online nodes in `region`
    pub fn in_region(&self, region: &str) -> Vec<EdgeNode> {
        self.entries
            .values()
            .filter(|e| e.node.region == region && e.node.is_online())
            .map(|e| e.node.clone())
            .collect()
    }

    /// Online node count for every known region
    pub fn region_online_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.entries.values() {
            let count = counts.entry(entry.node.region.clone()).or_insert(0);
            if entry.node.is_online() {
                *count += 1;
            }
        }
        counts
    }

    /// Registry statistics
    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            total_nodes: self.entries.len(),
            ..Default::default()
        };

        for entry in self.entries.values() {
            match entry.node.status {
                EdgeNodeStatus::Online => stats.online += 1,
                EdgeNodeStatus::Degraded => stats.degraded += 1,
                EdgeNodeStatus::Offline => stats.offline += 1,
                EdgeNodeStatus::Maintenance => stats.maintenance += 1,
            }
            stats.total_capacity += u64::from(entry.node.capacity);
            stats.available_capacity += u64::from(entry.node.available_capacity);
        }

        stats
    }
}

// ============================================================================
// Registry Statistics
// ============================================================================

/// Registry statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total_nodes: usize,
    pub online: usize,
    pub degraded: usize,
    pub offline: usize,
    pub maintenance: usize,
    pub total_capacity: u64,
    pub available_capacity: u64,
}

impl RegistryStats {
    /// Get availability percentage
    pub fn availability(&self) -> f64 {
        if self.total_nodes == 0 {
            0.0
        } else {
            ((self.online + self.degraded) as f64 / self.total_nodes as f64) * 100.0
        }
    }

    /// Format as display string
    pub fn display(&self) -> String {
        format!(
            "Edge Registry\n\
             {:-<30}\n\
             Total Nodes: {}\n\
             - Online: {}\n\
             - Degraded: {}\n\
             - Offline: {}\n\
             - Maintenance: {}\n\
             Availability: {:.1}%\n\
             Capacity: {}/{} free",
            "",
            self.total_nodes,
            self.online,
            self.degraded,
            self.offline,
            self.maintenance,
            self.availability(),
            self.available_capacity,
            self.total_capacity
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
