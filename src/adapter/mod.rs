//! Top-level coordinator
//!
//! The [`Adapter`] owns one [`NetworkDetector`], one [`EdgeNodeManager`], one
//! [`MetricsCollector`] and one [`QualitySelector`], binds at most one live
//! session to an edge node, and runs a status monitor that publishes
//! snapshots and advisory warnings.
//!
//! # Example
//!
//! ```no_run
//! use edgepulse::adapter::Adapter;
//! use edgepulse::api::SimulationProfile;
//! use edgepulse::config::AdapterConfig;
//!
//! #[tokio::main]
//! async fn main() -> edgepulse::Result<()> {
//!     let adapter = Adapter::simulated(AdapterConfig::default(), SimulationProfile::urban_5g())?;
//!     adapter.start().await?;
//!
//!     let session = adapter.start_session("call-1").await?;
//!     println!("routed through {}", session.edge_node_id);
//!     adapter.record_metric("latency", &serde_json::json!(24.5)).await;
//!
//!     adapter.end_session().await;
//!     adapter.stop().await
//! }
//! ```

pub mod builder;
pub mod session;
pub mod status;

use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};

use crate::api::{
    ApiClient, ClientConfig, MetricsReporter, NetworkProbe, NodeDirectory, SimulatedBackend,
    SimulationProfile,
};
use crate::clock::Clock;
use crate::config::AdapterConfig;
use crate::edge::{EdgeManagerConfig, EdgeNode, EdgeNodeManager, RegistryStats, SelectionCriteria};
use crate::error::{Error, Result};
use crate::metrics::{exporter, CollectorConfig, MetricsCollector, SampleKind, SessionMetrics};
use crate::network::{network_quality_score, DetectionResult, DetectorConfig, NetworkDetector, NetworkStatus};
use crate::observer::ObserverList;
use crate::quality::{QualityAdjustment, QualityLevel, QualitySelector, SelectorConfig};
use crate::task::TaskGroup;

pub use builder::AdapterBuilder;
pub use session::SessionContext;
pub use status::{
    evaluate_warnings, AdapterEvent, AdapterStatus, AdapterWarning, ComponentStates, WarningKind,
};

const COMPONENT: &str = "adapter";

/// Buffered events per subscriber before the oldest are dropped
const EVENT_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// Subsystems
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subsystem {
    Detector,
    EdgeManager,
    Collector,
}

impl Subsystem {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Detector => "network_detector",
            Self::EdgeManager => "edge_node_manager",
            Self::Collector => "metrics_collector",
        }
    }
}

// ============================================================================
// Metric input
// ============================================================================

/// A typed `record_metric` input
#[derive(Debug, Clone, Copy, PartialEq)]
enum MetricInput {
    Sample(SampleKind, f64),
    FramesDropped(u64),
    PacketsLost(u64),
    PacketSent(u64),
}

impl MetricInput {
    /// Interpret an untyped metric; `None` for unknown kinds or mistyped values
    fn parse(kind: &str, value: &Value) -> Option<Self> {
        let count = || match value {
            Value::Null => Some(1),
            other => other.as_u64(),
        };

        match kind {
            "latency" => value.as_f64().map(|v| Self::Sample(SampleKind::Latency, v)),
            "bandwidth" => value.as_f64().map(|v| Self::Sample(SampleKind::Bandwidth, v)),
            "packetLoss" => value.as_f64().map(|v| Self::Sample(SampleKind::PacketLoss, v)),
            "jitter" => value.as_f64().map(|v| Self::Sample(SampleKind::Jitter, v)),
            "frameDropped" => count().map(Self::FramesDropped),
            "packetLost" => count().map(Self::PacketsLost),
            "packetSent" => value.as_u64().map(Self::PacketSent),
            _ => None,
        }
    }
}

// ============================================================================
// Shared state
// ============================================================================

struct Shared {
    config: AdapterConfig,
    clock: Arc<dyn Clock>,

    detector: NetworkDetector,
    edge: EdgeNodeManager,
    collector: MetricsCollector,
    quality: RwLock<QualitySelector>,

    session: RwLock<Option<SessionContext>>,

    /// Network score at the last automatic adaptation
    auto_quality_baseline: RwLock<Option<u8>>,

    events: broadcast::Sender<AdapterEvent>,
    status_observers: ObserverList<AdapterStatus>,
    warning_observers: ObserverList<AdapterWarning>,

    started: AtomicBool,
}

impl Shared {
    fn subsystems(&self) -> Vec<Subsystem> {
        let mut subsystems = vec![Subsystem::Detector, Subsystem::EdgeManager];
        if self.config.enable_metrics_collection {
            subsystems.push(Subsystem::Collector);
        }
        subsystems
    }

    async fn start_subsystem(&self, subsystem: Subsystem) -> Result<()> {
        match subsystem {
            Subsystem::Detector => self.detector.start().await,
            Subsystem::EdgeManager => self.edge.start().await,
            Subsystem::Collector => self.collector.start().await,
        }
    }

    async fn stop_subsystem(&self, subsystem: Subsystem) {
        let result = match subsystem {
            Subsystem::Detector => self.detector.stop().await,
            Subsystem::EdgeManager => self.edge.stop().await,
            Subsystem::Collector => self.collector.stop().await,
        };
        if let Err(e) = result {
            tracing::warn!(subsystem = subsystem.as_str(), error = %e, "Failed to stop subsystem");
        }
    }

    fn emit(&self, event: AdapterEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    fn emit_warning(&self, warning: AdapterWarning) {
        tracing::warn!(
            kind = %warning.kind,
            value = ?warning.value,
            threshold = ?warning.threshold,
            session_id = ?warning.session_id,
            "{}",
            warning.message
        );
        exporter::record_warning(warning.kind.as_str());
        self.warning_observers.notify(warning.clone());
        self.emit(AdapterEvent::Warning(warning));
    }

    fn publish_status(&self, status: AdapterStatus) {
        self.status_observers.notify(status.clone());
        self.emit(AdapterEvent::Status(Box::new(status)));
    }

    async fn build_status(&self) -> AdapterStatus {
        let reading = self.detector.last_reading().await;
        let network = reading.clone().unwrap_or_default();

        let edge = self.edge.stats().await;
        let region_online_counts = self.edge.region_online_counts().await;

        let (quality_level, quality_profile) = {
            let selector = self.quality.read().await;
            (selector.current_level(), selector.current_profile().cloned())
        };

        let session = self.session.read().await.clone();
        let (session_metrics, global_metrics) = if self.config.enable_metrics_collection {
            let session_metrics = match &session {
                Some(ctx) => self.collector.session_metrics(&ctx.session_id).await,
                None => None,
            };
            (session_metrics, Some(self.collector.global_metrics().await))
        } else {
            (None, None)
        };

        let components = ComponentStates {
            detector: self.detector.is_running().await,
            edge_manager: self.edge.is_running().await,
            metrics_collector: self.collector.is_running().await,
            monitor: self.started.load(Ordering::SeqCst),
        };

        AdapterStatus {
            started: self.started.load(Ordering::SeqCst),
            healthy: healthy(&edge, region_online_counts.values().copied()),
            components,
            network_quality: network_quality_score(&network),
            is_5g_available: self.detector.is_5g_available().await,
            has_network_reading: reading.is_some(),
            network,
            edge,
            region_online_counts,
            quality_level,
            quality_profile,
            session,
            session_metrics,
            global_metrics,
            timestamp: self.clock.now(),
        }
    }

    /// Run the selector against the latest reading
    async fn adapt_quality(&self) -> Result<QualityLevel> {
        let reading = self.detector.last_reading().await.ok_or(Error::NoNetworkReading)?;

        let (from, to, debounced) = {
            let mut selector = self.quality.write().await;
            let debounced = selector.in_debounce_window();
            let from = selector.current_level();
            let to = selector.select_quality(reading.latency_ms, reading.bandwidth_mbps);
            (from, to, debounced)
        };

        // A debounced call decided nothing, so the baseline stays put
        if !debounced {
            *self.auto_quality_baseline.write().await = Some(network_quality_score(&reading));
        }
        self.apply_quality_change(from, to).await;
        Ok(to)
    }

    async fn apply_quality_change(&self, from: QualityLevel, to: QualityLevel) {
        if from == to {
            return;
        }

        if let Some(ctx) = self.session.write().await.as_mut() {
            ctx.quality = to;
        }

        tracing::info!(from = %from, to = %to, "Quality level changed");
        exporter::record_quality_change(to.as_str());
        self.emit(AdapterEvent::QualityChanged { from, to });
    }

    async fn monitor_tick(&self) {
        let status = self.build_status().await;
        let reading = status.has_network_reading.then(|| status.network.clone());

        let warnings = evaluate_warnings(
            &self.config,
            reading.as_ref(),
            status.session_metrics.as_ref(),
            self.clock.now(),
        );

        tracing::debug!(
            healthy = status.healthy,
            network_quality = status.network_quality,
            online_nodes = status.edge.online,
            warnings = warnings.len(),
            "Status tick"
        );

        let session_active = status.session.is_some();
        self.publish_status(status);
        for warning in warnings {
            self.emit_warning(warning);
        }

        if self.config.enable_auto_quality && session_active {
            if let Some(reading) = reading {
                self.auto_adapt(&reading).await;
            }
        }
    }

    /// Re-adapt when the network score moved past the switch threshold
    async fn auto_adapt(&self, reading: &NetworkStatus) {
        let score = network_quality_score(reading);
        let baseline = *self.auto_quality_baseline.read().await;

        let moved = baseline.map_or(true, |previous| {
            (f64::from(score) - f64::from(previous)).abs() >= self.config.quality_switch_threshold
        });
        if !moved {
            return;
        }

        if let Err(e) = self.adapt_quality().await {
            tracing::warn!(error = %e, "Automatic quality adaptation failed");
        }
    }
}

fn healthy(stats: &RegistryStats, mut region_online: impl Iterator<Item = usize>) -> bool {
    stats.total_nodes > 0 && region_online.any(|online| online > 0)
}

// ============================================================================
// Adapter
// ============================================================================

/// Coordinates network detection, edge selection, quality and metrics
pub struct Adapter {
    shared: Arc<Shared>,

    /// Monitor loop, present while started
    lifecycle: Mutex<Option<TaskGroup>>,
}

impl Adapter {
    /// Start building an adapter from `config`
    pub fn builder(config: AdapterConfig) -> AdapterBuilder {
        AdapterBuilder::new(config)
    }

    /// Adapter talking to the REST telemetry API at `config.api_base_url`
    pub fn from_api(config: AdapterConfig) -> Result<Self> {
        let client = ApiClient::new(ClientConfig::from(&config))
            .map_err(|e| Error::upstream("init_api_client", e))?;
        AdapterBuilder::new(config).with_backend(Arc::new(client)).build()
    }

    /// Adapter backed by an in-process simulation
    pub fn simulated(config: AdapterConfig, profile: SimulationProfile) -> Result<Self> {
        AdapterBuilder::new(config)
            .with_backend(Arc::new(SimulatedBackend::new(profile)))
            .build()
    }

    pub(crate) fn from_parts(
        config: AdapterConfig,
        probe: Arc<dyn NetworkProbe>,
        directory: Arc<dyn NodeDirectory>,
        reporter: Arc<dyn MetricsReporter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let detector = NetworkDetector::new(DetectorConfig::from(&config), probe, clock.clone());
        let edge = EdgeNodeManager::new(EdgeManagerConfig::from(&config), directory, clock.clone());
        let collector = MetricsCollector::new(CollectorConfig::from(&config), reporter, clock.clone());
        let quality = QualitySelector::new(SelectorConfig::from(&config), clock.clone());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            shared: Arc::new(Shared {
                config,
                clock,
                detector,
                edge,
                collector,
                quality: RwLock::new(quality),
                session: RwLock::new(None),
                auto_quality_baseline: RwLock::new(None),
                events,
                status_observers: ObserverList::new(),
                warning_observers: ObserverList::new(),
                started: AtomicBool::new(false),
            }),
            lifecycle: Mutex::new(None),
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Start every subsystem, then the status monitor
    ///
    /// If a subsystem fails to start, the ones already started are stopped
    /// again before the error is returned.
    pub async fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.is_some() {
            return Err(Error::AlreadyStarted);
        }

        let shared = &self.shared;
        let mut started = Vec::new();
        for subsystem in shared.subsystems() {
            if let Err(e) = shared.start_subsystem(subsystem).await {
                tracing::error!(subsystem = subsystem.as_str(), error = %e, "Subsystem failed to start");
                for running in started.into_iter().rev() {
                    shared.stop_subsystem(running).await;
                }
                return Err(e);
            }
            started.push(subsystem);
        }

        shared.started.store(true, Ordering::SeqCst);

        let mut group = TaskGroup::new(COMPONENT);
        let monitor = shared.clone();
        group.spawn_periodic("status_monitor", shared.config.status_interval(), move || {
            let monitor = monitor.clone();
            async move {
                monitor.monitor_tick().await;
            }
        });
        *lifecycle = Some(group);

        tracing::info!(
            subsystems = started.len(),
            status_interval_secs = shared.config.status_interval_secs,
            "Adapter started"
        );
        shared.emit(AdapterEvent::Started);

        let status = shared.build_status().await;
        shared.publish_status(status);
        Ok(())
    }

    /// Stop the monitor, end any session and stop every subsystem
    pub async fn stop(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        let group = lifecycle.take().ok_or(Error::NotStarted)?;

        group.shutdown().await;
        self.end_session().await;

        let shared = &self.shared;
        for subsystem in shared.subsystems().into_iter().rev() {
            shared.stop_subsystem(subsystem).await;
        }
        shared.started.store(false, Ordering::SeqCst);

        tracing::info!("Adapter stopped");
        shared.emit(AdapterEvent::Stopped);
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.shared.started.load(Ordering::SeqCst)
    }

    fn ensure_started(&self) -> Result<()> {
        if self.is_started() {
            Ok(())
        } else {
            Err(Error::NotStarted)
        }
    }

    // ------------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------------

    /// Bind a new session to the best edge node
    pub async fn start_session(&self, session_id: &str) -> Result<SessionContext> {
        self.ensure_started()?;
        let shared = &self.shared;

        // The slot stays locked through the connect so a concurrent
        // end_session cannot release the node before it is connected
        let context = {
            let mut slot = shared.session.write().await;
            if let Some(active) = slot.as_ref() {
                return Err(Error::SessionAlreadyActive(active.session_id.clone()));
            }

            let selection = match shared.edge.select_node(&SelectionCriteria::for_session()).await {
                Ok(selection) => selection,
                Err(e) => {
                    shared.emit_warning(
                        AdapterWarning::new(
                            WarningKind::NoEdgeNode,
                            format!("No edge node available for session {}: {}", session_id, e),
                            shared.clock.now(),
                        )
                        .with_session(session_id),
                    );
                    return Err(e);
                }
            };

            if shared.config.enable_metrics_collection {
                shared.collector.start_session(session_id, &selection.node.id).await?;
            }

            let quality = shared.quality.read().await.current_level();
            let context = SessionContext::new(session_id, &selection, quality, shared.clock.now());

            if let Err(e) = shared.edge.connect(&context.edge_node_id).await {
                shared.emit_warning(
                    AdapterWarning::new(
                        WarningKind::EdgeConnectionFailed,
                        format!("Connection to edge node {} failed: {}", context.edge_node_id, e),
                        shared.clock.now(),
                    )
                    .with_session(session_id),
                );
            }

            *slot = Some(context.clone());
            context
        };

        tracing::info!(
            session_id = %session_id,
            edge_node_id = %context.edge_node_id,
            region = %context.edge_region,
            alternatives = context.alternative_node_ids.len(),
            "Session started"
        );
        exporter::record_session_event("started", 1);
        shared.emit(AdapterEvent::SessionStarted(context.clone()));
        Ok(context)
    }

    /// End the active session, if any, returning its final metrics
    pub async fn end_session(&self) -> Option<SessionMetrics> {
        let shared = &self.shared;
        let context = shared.session.write().await.take()?;

        let metrics = if shared.config.enable_metrics_collection {
            match shared.collector.end_session(&context.session_id).await {
                Ok(metrics) => Some(metrics),
                Err(e) => {
                    tracing::warn!(session_id = %context.session_id, error = %e, "Failed to finalize session metrics");
                    None
                }
            }
        } else {
            None
        };

        shared.edge.disconnect(&context.edge_node_id).await;
        *shared.auto_quality_baseline.write().await = None;

        tracing::info!(
            session_id = %context.session_id,
            bytes_sent = context.bytes_sent,
            packets_sent = context.packets_sent,
            "Session ended"
        );
        exporter::record_session_event("ended", 0);
        shared.emit(AdapterEvent::SessionEnded {
            session_id: context.session_id,
            metrics: metrics.clone(),
        });
        metrics
    }

    pub async fn current_session(&self) -> Option<SessionContext> {
        self.shared.session.read().await.clone()
    }

    // ------------------------------------------------------------------------
    // Quality
    // ------------------------------------------------------------------------

    /// Re-select the quality level for the latest network reading
    pub async fn adapt_quality(&self) -> Result<QualityLevel> {
        self.ensure_started()?;
        self.shared.adapt_quality().await
    }

    /// Force a quality level
    pub async fn set_quality(&self, level: QualityLevel) -> Result<QualityLevel> {
        let (from, to) = {
            let mut selector = self.shared.quality.write().await;
            let from = selector.current_level();
            (from, selector.set_profile(level)?)
        };
        self.shared.apply_quality_change(from, to).await;
        Ok(to)
    }

    pub async fn quality_level(&self) -> QualityLevel {
        self.shared.quality.read().await.current_level()
    }

    pub async fn quality_history(&self) -> Vec<QualityAdjustment> {
        self.shared.quality.read().await.history()
    }

    // ------------------------------------------------------------------------
    // Metrics
    // ------------------------------------------------------------------------

    /// Record one metric for the active session
    ///
    /// Returns whether the metric was recorded. Nothing is recorded when
    /// collection is disabled, no session is active, the kind is unknown or
    /// the value has the wrong type.
    pub async fn record_metric(&self, kind: &str, value: &Value) -> bool {
        let shared = &self.shared;
        if !shared.config.enable_metrics_collection {
            return false;
        }

        let Some(session_id) = shared.session.read().await.as_ref().map(|s| s.session_id.clone()) else {
            return false;
        };

        let Some(input) = MetricInput::parse(kind, value) else {
            tracing::debug!(kind = %kind, value = %value, "Ignoring unrecognized metric");
            return false;
        };

        let collector = &shared.collector;
        let result = match input {
            MetricInput::Sample(sample_kind, v) => match sample_kind {
                SampleKind::Latency => collector.record_latency(&session_id, v).await,
                SampleKind::Bandwidth => collector.record_bandwidth(&session_id, v).await,
                SampleKind::PacketLoss => collector.record_packet_loss(&session_id, v).await,
                SampleKind::Jitter => collector.record_jitter(&session_id, v).await,
            },
            MetricInput::FramesDropped(count) => collector.record_frames_dropped(&session_id, count).await,
            MetricInput::PacketsLost(count) => collector.record_packets_lost(&session_id, count).await,
            MetricInput::PacketSent(bytes) => {
                let result = collector.record_packet_sent(&session_id, bytes).await;
                if result.is_ok() {
                    if let Some(ctx) = shared.session.write().await.as_mut() {
                        ctx.add_packet(bytes);
                    }
                }
                result
            }
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(session_id = %session_id, kind = %kind, error = %e, "Metric not recorded");
                false
            }
        }
    }

    pub async fn session_metrics(&self, session_id: &str) -> Option<SessionMetrics> {
        self.shared.collector.session_metrics(session_id).await
    }

    // ------------------------------------------------------------------------
    // Status and network
    // ------------------------------------------------------------------------

    /// Composite snapshot of every component
    pub async fn status(&self) -> AdapterStatus {
        self.shared.build_status().await
    }

    /// Whether any region has an online node
    pub async fn is_healthy(&self) -> bool {
        let stats = self.shared.edge.stats().await;
        let counts = self.shared.edge.region_online_counts().await;
        healthy(&stats, counts.into_values())
    }

    /// Run one detection now, bounded by `timeout`
    pub async fn detect_network(&self, timeout: Duration) -> Result<DetectionResult> {
        tokio::time::timeout(timeout, self.shared.detector.detect_network())
            .await
            .map_err(|_| Error::timeout("detect_network", timeout))
    }

    pub async fn edge_nodes(&self) -> Vec<EdgeNode> {
        self.shared.edge.nodes().await
    }

    // ------------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------------

    pub fn subscribe(&self) -> broadcast::Receiver<AdapterEvent> {
        self.shared.events.subscribe()
    }

    /// Register a callback for every status snapshot
    pub fn on_status<F>(&self, callback: F)
    where
        F: Fn(AdapterStatus) + Send + Sync + 'static,
    {
        self.shared.status_observers.register(callback);
    }

    /// Register a callback for every warning
    pub fn on_warning<F>(&self, callback: F)
    where
        F: Fn(AdapterWarning) + Send + Sync + 'static,
    {
        self.shared.warning_observers.register(callback);
    }

    // ------------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------------

    pub fn config(&self) -> &AdapterConfig {
        &self.shared.config
    }

    pub fn detector(&self) -> &NetworkDetector {
        &self.shared.detector
    }

    pub fn edge_manager(&self) -> &EdgeNodeManager {
        &self.shared.edge
    }

    pub fn collector(&self) -> &MetricsCollector {
        &self.shared.collector
    }
}
