//! Common test utilities
//!
//! Scripted collaborators whose answers tests can change between steps.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use edgepulse::adapter::Adapter;
use edgepulse::api::{ClientError, LinkStatus, MetricsReporter, NetworkProbe, NodeDirectory};
use edgepulse::clock::ManualClock;
use edgepulse::config::AdapterConfig;
use edgepulse::edge::EdgeNode;
use edgepulse::metrics::SessionMetrics;

// ============================================================================
// Probe
// ============================================================================

/// Probe returning fixed measurements until told otherwise
pub struct ScriptedProbe {
    state: Mutex<ProbeState>,
}

struct ProbeState {
    latency_ms: f64,
    bandwidth_mbps: f64,
    connected: bool,
    failing: bool,
    delay: Option<Duration>,
}

impl ScriptedProbe {
    pub fn new(latency_ms: f64, bandwidth_mbps: f64) -> Self {
        Self {
            state: Mutex::new(ProbeState {
                latency_ms,
                bandwidth_mbps,
                connected: true,
                failing: false,
                delay: None,
            }),
        }
    }

    pub fn set_link(&self, latency_ms: f64, bandwidth_mbps: f64) {
        let mut state = self.state.lock().unwrap();
        state.latency_ms = latency_ms;
        state.bandwidth_mbps = bandwidth_mbps;
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.lock().unwrap().connected = connected;
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }

    /// Make every measurement take `delay`
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.lock().unwrap().delay = delay;
    }

    async fn check(&self) -> Result<(), ClientError> {
        let (failing, delay) = {
            let state = self.state.lock().unwrap();
            (state.failing, state.delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if failing {
            Err(ClientError::Unavailable("probe offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl NetworkProbe for ScriptedProbe {
    async fn link_status(&self) -> Result<LinkStatus, ClientError> {
        self.check().await?;
        Ok(LinkStatus {
            connected: self.state.lock().unwrap().connected,
            signal_strength: -70,
        })
    }

    async fn measure_latency(&self) -> Result<f64, ClientError> {
        self.check().await?;
        Ok(self.state.lock().unwrap().latency_ms)
    }

    async fn measure_bandwidth(&self) -> Result<f64, ClientError> {
        self.check().await?;
        Ok(self.state.lock().unwrap().bandwidth_mbps)
    }
}

// ============================================================================
// Directory
// ============================================================================

/// Directory serving a mutable node list
pub struct ScriptedDirectory {
    nodes: Mutex<Vec<EdgeNode>>,
    unhealthy: Mutex<HashSet<String>>,
    refuse_connect: Mutex<bool>,
    connect_delay: Mutex<Option<Duration>>,
    pub fetches: AtomicUsize,
    pub connects: AtomicUsize,
}

impl ScriptedDirectory {
    pub fn new(nodes: Vec<EdgeNode>) -> Self {
        Self {
            nodes: Mutex::new(nodes),
            unhealthy: Mutex::new(HashSet::new()),
            refuse_connect: Mutex::new(false),
            connect_delay: Mutex::new(None),
            fetches: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
        }
    }

    pub fn set_nodes(&self, nodes: Vec<EdgeNode>) {
        *self.nodes.lock().unwrap() = nodes;
    }

    pub fn set_unhealthy(&self, node_id: &str, unhealthy: bool) {
        let mut set = self.unhealthy.lock().unwrap();
        if unhealthy {
            set.insert(node_id.to_string());
        } else {
            set.remove(node_id);
        }
    }

    pub fn refuse_connections(&self, refuse: bool) {
        *self.refuse_connect.lock().unwrap() = refuse;
    }

    /// Make every connect take `delay`
    pub fn set_connect_delay(&self, delay: Option<Duration>) {
        *self.connect_delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl NodeDirectory for ScriptedDirectory {
    async fn fetch_nodes(&self) -> Result<Vec<EdgeNode>, ClientError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.nodes.lock().unwrap().clone())
    }

    async fn check_node(&self, node: &EdgeNode) -> Result<f64, ClientError> {
        if self.unhealthy.lock().unwrap().contains(&node.id) {
            return Err(ClientError::Unavailable(format!("{} unreachable", node.id)));
        }
        Ok(node.latency_ms)
    }

    async fn connect_node(&self, node_id: &str) -> Result<(), ClientError> {
        let delay = *self.connect_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.refuse_connect.lock().unwrap() {
            return Err(ClientError::HttpError {
                status: 503,
                message: format!("{node_id} refused"),
            });
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Reporter
// ============================================================================

/// Reporter remembering every report it receives
#[derive(Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<SessionMetrics>>,
}

impl RecordingReporter {
    pub fn reports(&self) -> Vec<SessionMetrics> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetricsReporter for RecordingReporter {
    async fn report_session(&self, metrics: &SessionMetrics) -> Result<(), ClientError> {
        self.reports.lock().unwrap().push(metrics.clone());
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

/// An adapter wired to scripted collaborators and a manual clock
pub struct Harness {
    pub adapter: Adapter,
    pub probe: Arc<ScriptedProbe>,
    pub directory: Arc<ScriptedDirectory>,
    pub reporter: Arc<RecordingReporter>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(nodes: Vec<EdgeNode>) -> Self {
        Self::with_config(AdapterConfig::default(), nodes)
    }

    pub fn with_config(config: AdapterConfig, nodes: Vec<EdgeNode>) -> Self {
        let probe = Arc::new(ScriptedProbe::new(20.0, 80.0));
        let directory = Arc::new(ScriptedDirectory::new(nodes));
        let reporter = Arc::new(RecordingReporter::default());
        let clock = Arc::new(ManualClock::starting_now());

        let adapter = Adapter::builder(config)
            .probe(probe.clone())
            .directory(directory.clone())
            .reporter(reporter.clone())
            .clock(clock.clone())
            .build()
            .expect("valid adapter");

        Self {
            adapter,
            probe,
            directory,
            reporter,
            clock,
        }
    }
}

/// Online node with the given directory latency and capacity
pub fn node(id: &str, region: &str, latency_ms: f64, capacity: u32, available: u32) -> EdgeNode {
    EdgeNode::new(id, region, format!("https://{id}.edge.test"))
        .with_latency(latency_ms)
        .with_capacity(capacity, available)
}
