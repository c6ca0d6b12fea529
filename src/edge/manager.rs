//! Async owner of the edge node registry
//!
//! The manager runs two loops while started: a health-check round every
//! `health_check_interval` and a full directory re-discovery every
//! `discovery_interval`. Each node in a round is checked on its own task.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use super::{EdgeNode, EdgeNodeMetrics, NodeRegistry, NodeSelection, RegistryStats, SelectionCriteria};
use crate::api::{call_with_timeout, NodeDirectory};
use crate::clock::Clock;
use crate::config::{AdapterConfig, ConfigError};
use crate::error::{Error, Result};
use crate::metrics::exporter;
use crate::task::TaskGroup;

const COMPONENT: &str = "edge node manager";

// ============================================================================
// Configuration
// ============================================================================

/// Edge manager configuration
#[derive(Debug, Clone)]
pub struct EdgeManagerConfig {
    /// Time between health check rounds
    pub health_check_interval: Duration,

    /// Time between directory re-discovery
    pub discovery_interval: Duration,

    /// Per-node health check timeout
    pub health_check_timeout: Duration,

    /// Timeout for directory calls
    pub request_timeout: Duration,

    /// Maximum concurrent node connections
    pub max_connections: usize,
}

impl Default for EdgeManagerConfig {
    fn default() -> Self {
        Self::from(&AdapterConfig::default())
    }
}

impl From<&AdapterConfig> for EdgeManagerConfig {
    fn from(config: &AdapterConfig) -> Self {
        Self {
            health_check_interval: config.health_check_interval(),
            discovery_interval: config.discovery_interval(),
            health_check_timeout: config.health_check_timeout(),
            request_timeout: config.request_timeout(),
            max_connections: config.max_edge_connections,
        }
    }
}

impl EdgeManagerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.health_check_interval.is_zero() {
            return Err(ConfigError::invalid("health_check_interval", "must be greater than 0"));
        }
        if self.discovery_interval.is_zero() {
            return Err(ConfigError::invalid("discovery_interval", "must be greater than 0"));
        }
        if self.health_check_timeout.is_zero() {
            return Err(ConfigError::invalid("health_check_timeout", "must be greater than 0"));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::invalid("max_edge_connections", "must be greater than 0"));
        }
        Ok(())
    }
}

/// Outcome of one health check round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckSummary {
    pub checked: usize,
    pub healthy: usize,
    pub failed: usize,
}

// ============================================================================
// Edge Node Manager
// ============================================================================

struct ManagerInner {
    config: EdgeManagerConfig,
    directory: Arc<dyn NodeDirectory>,
    clock: Arc<dyn Clock>,
    registry: RwLock<NodeRegistry>,
    connections: RwLock<BTreeSet<String>>,
}

impl ManagerInner {
    async fn refresh(&self) -> Result<usize> {
        let nodes = call_with_timeout(
            "fetch_nodes",
            self.config.request_timeout,
            self.directory.fetch_nodes(),
        )
        .await?;

        let count = nodes.len();
        let stats = {
            let mut registry = self.registry.write().await;
            registry.replace_all(nodes, self.clock.now());
            registry.stats()
        };
        exporter::update_edge_nodes(stats.total_nodes, stats.online);

        tracing::debug!(nodes = count, "Edge node registry refreshed");
        Ok(count)
    }

    async fn check_all(&self) -> HealthCheckSummary {
        let nodes = self.registry.read().await.checkable_nodes();
        if nodes.is_empty() {
            return HealthCheckSummary::default();
        }

        let timeout = self.config.health_check_timeout;
        let handles: Vec<_> = nodes
            .into_iter()
            .map(|node| {
                let directory = self.directory.clone();
                tokio::spawn(async move {
                    let outcome = call_with_timeout("check_node", timeout, directory.check_node(&node)).await;
                    (node.id, outcome)
                })
            })
            .collect();

        let mut summary = HealthCheckSummary::default();
        let mut updated = Vec::with_capacity(handles.len());

        for joined in futures::future::join_all(handles).await {
            let (id, outcome) = match joined {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!("Health check task ended abnormally: {}", e);
                    continue;
                }
            };

            summary.checked += 1;
            let now = self.clock.now();
            let mut registry = self.registry.write().await;
            let applied = match outcome {
                Ok(rtt_ms) => {
                    summary.healthy += 1;
                    tracing::trace!(node_id = %id, rtt_ms, "Health check passed");
                    registry.record_check_success(&id, rtt_ms, now)
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::debug!(node_id = %id, error = %e, "Health check failed");
                    registry.record_check_failure(&id, e.to_string(), now)
                }
            };

            // A refresh may have dropped the node while it was being checked
            if let Ok(metrics) = applied {
                updated.push(metrics);
            }
        }

        exporter::record_health_checks(summary.healthy, summary.failed);
        let stats = self.registry.read().await.stats();
        exporter::update_edge_nodes(stats.total_nodes, stats.online);

        for metrics in &updated {
            if let Err(e) = call_with_timeout(
                "report_node_health",
                self.config.request_timeout,
                self.directory.report_node_health(metrics),
            )
            .await
            {
                tracing::debug!(node_id = %metrics.node_id, error = %e, "Node health report dropped");
            }
        }

        summary
    }
}

/// Owns the edge node registry and its background maintenance
pub struct EdgeNodeManager {
    inner: Arc<ManagerInner>,
    tasks: Mutex<Option<TaskGroup>>,
}

impl EdgeNodeManager {
    /// Create a stopped manager with an empty registry
    pub fn new(config: EdgeManagerConfig, directory: Arc<dyn NodeDirectory>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                directory,
                clock,
                registry: RwLock::new(NodeRegistry::new()),
                connections: RwLock::new(BTreeSet::new()),
            }),
            tasks: Mutex::new(None),
        }
    }

    /// Fetch the directory, then start health check and discovery loops
    ///
    /// A failed initial fetch is logged and the manager starts with an empty
    /// registry; the discovery loop retries.
    pub async fn start(&self) -> Result<()> {
        self.inner.config.validate()?;

        let mut tasks = self.tasks.lock().await;
        if tasks.is_some() {
            return Err(Error::AlreadyRunning { component: COMPONENT });
        }

        match self.inner.refresh().await {
            Ok(count) => tracing::info!(nodes = count, "Initial edge node discovery complete"),
            Err(e) => tracing::warn!(error = %e, "Initial edge node discovery failed, starting empty"),
        }

        let mut group = TaskGroup::new(COMPONENT);

        let inner = self.inner.clone();
        group.spawn_periodic("health_check", self.inner.config.health_check_interval, move || {
            let inner = inner.clone();
            async move {
                let summary = inner.check_all().await;
                if summary.failed > 0 {
                    tracing::warn!(
                        checked = summary.checked,
                        failed = summary.failed,
                        "Edge health check round had failures"
                    );
                }
            }
        });

        let inner = self.inner.clone();
        group.spawn_periodic("discovery", self.inner.config.discovery_interval, move || {
            let inner = inner.clone();
            async move {
                if let Err(e) = inner.refresh().await {
                    tracing::warn!(error = %e, "Edge node re-discovery failed");
                }
            }
        });

        *tasks = Some(group);
        tracing::info!("Edge node manager started");
        Ok(())
    }

    /// Stop both loops
    pub async fn stop(&self) -> Result<()> {
        let group = self
            .tasks
            .lock()
            .await
            .take()
            .ok_or(Error::NotRunning { component: COMPONENT })?;

        group.shutdown().await;
        tracing::info!("Edge node manager stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.tasks.lock().await.is_some()
    }

    /// Replace the registry with a fresh directory listing
    pub async fn refresh_nodes(&self) -> Result<usize> {
        self.inner.refresh().await
    }

    /// Run one health check round now
    pub async fn check_all_nodes(&self) -> HealthCheckSummary {
        self.inner.check_all().await
    }

    /// Select the best node for `criteria`
    pub async fn select_node(&self, criteria: &SelectionCriteria) -> Result<NodeSelection> {
        let selection = self.inner.registry.read().await.select(criteria)?;
        tracing::debug!(
            node_id = %selection.node.id,
            region = %selection.node.region,
            alternatives = selection.alternatives.len(),
            "Edge node selected"
        );
        Ok(selection)
    }

    /// Update load figures for a node
    pub async fn report_node_load(&self, node_id: &str, current_load: u32, capacity: u32) -> Result<EdgeNode> {
        let now = self.inner.clock.now();
        self.inner
            .registry
            .write()
            .await
            .report_load(node_id, current_load, capacity, now)
    }

    // ------------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------------

    /// Connect to a node through the directory
    ///
    /// Connecting to an already connected node is a no-op.
    pub async fn connect(&self, node_id: &str) -> Result<()> {
        if self.inner.registry.read().await.get(node_id).is_none() {
            return Err(Error::NodeNotFound(node_id.to_string()));
        }

        {
            let connections = self.inner.connections.read().await;
            if connections.contains(node_id) {
                return Ok(());
            }
            if connections.len() >= self.inner.config.max_connections {
                return Err(Error::ConnectionLimit {
                    max: self.inner.config.max_connections,
                });
            }
        }

        call_with_timeout(
            "connect_node",
            self.inner.config.request_timeout,
            self.inner.directory.connect_node(node_id),
        )
        .await?;

        let mut connections = self.inner.connections.write().await;
        if connections.len() >= self.inner.config.max_connections && !connections.contains(node_id) {
            return Err(Error::ConnectionLimit {
                max: self.inner.config.max_connections,
            });
        }
        connections.insert(node_id.to_string());

        tracing::info!(node_id = %node_id, active = connections.len(), "Connected to edge node");
        Ok(())
    }

    /// Release a connection; returns whether it existed
    pub async fn disconnect(&self, node_id: &str) -> bool {
        let removed = self.inner.connections.write().await.remove(node_id);
        if removed {
            tracing::info!(node_id = %node_id, "Disconnected from edge node");
        }
        removed
    }

    /// Ids of connected nodes
    pub async fn connected_nodes(&self) -> Vec<String> {
        self.inner.connections.read().await.iter().cloned().collect()
    }

    // ------------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------------

    pub async fn node(&self, node_id: &str) -> Option<EdgeNode> {
        self.inner.registry.read().await.get(node_id)
    }

    pub async fn node_metrics(&self, node_id: &str) -> Option<EdgeNodeMetrics> {
        self.inner.registry.read().await.metrics(node_id)
    }

    pub async fn all_metrics(&self) -> Vec<EdgeNodeMetrics> {
        self.inner.registry.read().await.all_metrics()
    }

    /// All nodes ordered by id
    pub async fn nodes(&self) -> Vec<EdgeNode> {
        self.inner.registry.read().await.nodes()
    }

    pub async fn node_count(&self) -> usize {
        self.inner.registry.read().await.len()
    }

    pub async fn nodes_by_load(&self) -> Vec<EdgeNode> {
        self.inner.registry.read().await.by_load()
    }

    pub async fn nodes_by_latency(&self) -> Vec<EdgeNode> {
        self.inner.registry.read().await.by_latency()
    }

    pub async fn hot_nodes(&self) -> Vec<EdgeNode> {
        self.inner.registry.read().await.hot_nodes()
    }

    pub async fn cold_nodes(&self) -> Vec<EdgeNode> {
        self.inner.registry.read().await.cold_nodes()
    }

    pub async fn nodes_in_region(&self, region: &str) -> Vec<EdgeNode> {
        self.inner.registry.read().await.in_region(region)
    }

    pub async fn region_online_counts(&self) -> BTreeMap<String, usize> {
        self.inner.registry.read().await.region_online_counts()
    }

    pub async fn stats(&self) -> RegistryStats {
        self.inner.registry.read().await.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ClientError;
    use crate::clock::system_clock;
    use crate::edge::EdgeNodeStatus;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeDirectory {
        nodes: std::sync::Mutex<Vec<EdgeNode>>,
        failing: std::sync::Mutex<HashSet<String>>,
        fetch_fails: std::sync::atomic::AtomicBool,
        reports: AtomicUsize,
        connects: AtomicUsize,
    }

    impl FakeDirectory {
        fn with_nodes(nodes: Vec<EdgeNode>) -> Arc<Self> {
            let directory = Self::default();
            *directory.nodes.lock().unwrap() = nodes;
            Arc::new(directory)
        }

        fn fail(&self, id: &str) {
            self.failing.lock().unwrap().insert(id.to_string());
        }

        fn heal(&self, id: &str) {
            self.failing.lock().unwrap().remove(id);
        }
    }

    #[async_trait]
    impl NodeDirectory for FakeDirectory {
        async fn fetch_nodes(&self) -> std::result::Result<Vec<EdgeNode>, ClientError> {
            if self.fetch_fails.load(Ordering::SeqCst) {
                return Err(ClientError::Unavailable("directory down".into()));
            }
            Ok(self.nodes.lock().unwrap().clone())
        }

        async fn check_node(&self, node: &EdgeNode) -> std::result::Result<f64, ClientError> {
            if self.failing.lock().unwrap().contains(&node.id) {
                Err(ClientError::NetworkError("unreachable".into()))
            } else {
                Ok(node.latency_ms)
            }
        }

        async fn report_node_health(&self, _metrics: &EdgeNodeMetrics) -> std::result::Result<(), ClientError> {
            self.reports.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn connect_node(&self, _node_id: &str) -> std::result::Result<(), ClientError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn node(id: &str, region: &str, latency: f64) -> EdgeNode {
        EdgeNode::new(id, region, format!("https://{id}.edge"))
            .with_latency(latency)
            .with_capacity(100, 50)
    }

    fn manager(directory: Arc<FakeDirectory>) -> EdgeNodeManager {
        EdgeNodeManager::new(EdgeManagerConfig::default(), directory, system_clock())
    }

    #[tokio::test]
    async fn test_start_fetches_nodes() {
        let directory = FakeDirectory::with_nodes(vec![node("a", "us-east", 10.0)]);
        let manager = manager(directory);

        manager.start().await.unwrap();
        assert_eq!(manager.node_count().await, 1);
        assert!(matches!(manager.start().await, Err(Error::AlreadyRunning { .. })));

        manager.stop().await.unwrap();
        assert!(matches!(manager.stop().await, Err(Error::NotRunning { .. })));
    }

    #[tokio::test]
    async fn test_start_survives_failed_initial_fetch() {
        let directory = FakeDirectory::with_nodes(vec![node("a", "us-east", 10.0)]);
        directory.fetch_fails.store(true, Ordering::SeqCst);
        let manager = manager(directory.clone());

        manager.start().await.unwrap();
        assert_eq!(manager.node_count().await, 0);
        assert!(matches!(
            manager.select_node(&SelectionCriteria::default()).await,
            Err(Error::NoNodes)
        ));

        directory.fetch_fails.store(false, Ordering::SeqCst);
        assert_eq!(manager.refresh_nodes().await.unwrap(), 1);
        manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_health_rounds_mark_offline_then_restore() {
        let directory = FakeDirectory::with_nodes(vec![node("a", "us-east", 10.0), node("b", "eu-west", 20.0)]);
        let manager = manager(directory.clone());
        manager.refresh_nodes().await.unwrap();

        directory.fail("a");
        for round in 1..=3 {
            let summary = manager.check_all_nodes().await;
            assert_eq!(summary.checked, 2);
            assert_eq!(summary.failed, 1);
            let expected = if round < 3 { EdgeNodeStatus::Online } else { EdgeNodeStatus::Offline };
            assert_eq!(manager.node("a").await.unwrap().status, expected);
        }
        assert_eq!(directory.reports.load(Ordering::SeqCst), 6);

        let selection = manager.select_node(&SelectionCriteria::for_session()).await.unwrap();
        assert_eq!(selection.node.id, "b");

        directory.heal("a");
        manager.check_all_nodes().await;
        assert_eq!(manager.node("a").await.unwrap().status, EdgeNodeStatus::Online);
        assert_eq!(manager.node_metrics("a").await.unwrap().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_maintenance_nodes_are_not_checked() {
        let directory = FakeDirectory::with_nodes(vec![
            node("a", "us-east", 10.0).with_status(EdgeNodeStatus::Maintenance),
        ]);
        directory.fail("a");
        let manager = manager(directory);
        manager.refresh_nodes().await.unwrap();

        let summary = manager.check_all_nodes().await;
        assert_eq!(summary.checked, 0);
        assert_eq!(manager.node("a").await.unwrap().status, EdgeNodeStatus::Maintenance);
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let directory = FakeDirectory::with_nodes(vec![node("a", "us-east", 10.0), node("b", "us-east", 10.0)]);
        let config = EdgeManagerConfig {
            max_connections: 1,
            ..EdgeManagerConfig::default()
        };
        let manager = EdgeNodeManager::new(config, directory.clone(), system_clock());
        manager.refresh_nodes().await.unwrap();

        manager.connect("a").await.unwrap();
        manager.connect("a").await.unwrap();
        assert_eq!(directory.connects.load(Ordering::SeqCst), 1);
        assert!(matches!(manager.connect("b").await, Err(Error::ConnectionLimit { max: 1 })));
        assert!(matches!(manager.connect("zzz").await, Err(Error::NodeNotFound(_))));

        assert!(manager.disconnect("a").await);
        manager.connect("b").await.unwrap();
        assert_eq!(manager.connected_nodes().await, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_report_node_load_unknown() {
        let manager = manager(FakeDirectory::with_nodes(vec![]));
        assert!(matches!(
            manager.report_node_load("ghost", 1, 10).await,
            Err(Error::NodeNotFound(_))
        ));
    }
}
