//! Session metrics collection, aggregation and reporting

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};

use super::exporter;
use super::session::{GlobalMetrics, MetricSample, SampleKind, SessionMetrics, SessionSortKey};
use crate::api::{call_with_timeout, MetricsReporter};
use crate::clock::Clock;
use crate::config::{AdapterConfig, ConfigError};
use crate::error::{Error, Result};
use crate::observer::ObserverList;
use crate::task::TaskGroup;

const COMPONENT: &str = "metrics collector";

/// Collector configuration
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Time between aggregation/report ticks
    pub report_interval: Duration,

    /// Per-report timeout
    pub request_timeout: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self::from(&AdapterConfig::default())
    }
}

impl From<&AdapterConfig> for CollectorConfig {
    fn from(config: &AdapterConfig) -> Self {
        Self {
            report_interval: config.metrics_report_interval(),
            request_timeout: config.request_timeout(),
        }
    }
}

impl CollectorConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.report_interval.is_zero() {
            return Err(ConfigError::invalid("metrics_report_interval", "must be greater than 0"));
        }
        Ok(())
    }
}

struct CollectorInner {
    config: CollectorConfig,
    reporter: Arc<dyn MetricsReporter>,
    clock: Arc<dyn Clock>,
    sessions: RwLock<BTreeMap<String, SessionMetrics>>,
    global: RwLock<GlobalMetrics>,
    aggregation_observers: ObserverList<GlobalMetrics>,
    session_observers: ObserverList<SessionMetrics>,
}

impl CollectorInner {
    async fn aggregate(&self) -> GlobalMetrics {
        let now = self.clock.now();
        let (global, active) = {
            let sessions = self.sessions.read().await;
            let previous_peak = self.global.read().await.peak_concurrent_sessions;
            let global = GlobalMetrics::aggregate(sessions.values(), previous_peak, now);
            let active: Vec<SessionMetrics> = sessions.values().filter(|s| s.is_active()).cloned().collect();
            (global, active)
        };

        *self.global.write().await = global.clone();
        self.aggregation_observers.notify(global.clone());

        let timeout = self.config.request_timeout;
        let reports = active.iter().map(|session| async move {
            let outcome = call_with_timeout("report_session", timeout, self.reporter.report_session(session)).await;
            (session, outcome)
        });

        for (session, outcome) in futures::future::join_all(reports).await {
            if let Err(e) = outcome {
                tracing::warn!(session_id = %session.session_id, error = %e, "Session metrics report failed");
            }
            self.session_observers.notify(session.clone());
        }

        tracing::debug!(
            active = global.active_sessions,
            total = global.total_sessions,
            "Metrics aggregated"
        );
        global
    }

    async fn update_active<F>(&self, session_id: &str, update: F) -> Result<()>
    where
        F: FnOnce(&mut SessionMetrics),
    {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        if !session.is_active() {
            return Err(Error::SessionNotActive(session_id.to_string()));
        }
        update(session);
        Ok(())
    }
}

/// Tracks per-session samples and produces global snapshots
pub struct MetricsCollector {
    inner: Arc<CollectorInner>,
    tasks: Mutex<Option<TaskGroup>>,
}

impl MetricsCollector {
    pub fn new(config: CollectorConfig, reporter: Arc<dyn MetricsReporter>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(CollectorInner {
                config,
                reporter,
                clock,
                sessions: RwLock::new(BTreeMap::new()),
                global: RwLock::new(GlobalMetrics::default()),
                aggregation_observers: ObserverList::new(),
                session_observers: ObserverList::new(),
            }),
            tasks: Mutex::new(None),
        }
    }

    /// Start the aggregation/report loop
    pub async fn start(&self) -> Result<()> {
        self.inner.config.validate()?;

        let mut tasks = self.tasks.lock().await;
        if tasks.is_some() {
            return Err(Error::AlreadyRunning { component: COMPONENT });
        }

        let mut group = TaskGroup::new(COMPONENT);
        let inner = self.inner.clone();
        group.spawn_periodic("aggregate", self.inner.config.report_interval, move || {
            let inner = inner.clone();
            async move {
                inner.aggregate().await;
            }
        });
        *tasks = Some(group);

        tracing::info!(
            interval_secs = self.inner.config.report_interval.as_secs(),
            "Metrics collector started"
        );
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        let group = self
            .tasks
            .lock()
            .await
            .take()
            .ok_or(Error::NotRunning { component: COMPONENT })?;

        group.shutdown().await;
        tracing::info!("Metrics collector stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.tasks.lock().await.is_some()
    }

    /// Run one aggregation/report tick now
    pub async fn aggregate_now(&self) -> GlobalMetrics {
        self.inner.aggregate().await
    }

    /// Observe every aggregation snapshot
    pub fn on_aggregation<F>(&self, callback: F)
    where
        F: Fn(GlobalMetrics) + Send + Sync + 'static,
    {
        self.inner.aggregation_observers.register(callback);
    }

    /// Observe every active session on each tick
    pub fn on_session_update<F>(&self, callback: F)
    where
        F: Fn(SessionMetrics) + Send + Sync + 'static,
    {
        self.inner.session_observers.register(callback);
    }

    // ------------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------------

    /// Begin tracking a session
    ///
    /// Fails if a session with the same id is active; a completed one is
    /// replaced.
    pub async fn start_session(&self, session_id: &str, edge_node_id: &str) -> Result<SessionMetrics> {
        let mut sessions = self.inner.sessions.write().await;
        if sessions.get(session_id).is_some_and(SessionMetrics::is_active) {
            return Err(Error::SessionAlreadyActive(session_id.to_string()));
        }

        let metrics = SessionMetrics::new(session_id, edge_node_id, self.inner.clock.now());
        sessions.insert(session_id.to_string(), metrics.clone());

        tracing::info!(session_id = %session_id, edge_node_id = %edge_node_id, "Metrics session started");
        Ok(metrics)
    }

    /// Complete a session; completing twice returns the stored snapshot
    pub async fn end_session(&self, session_id: &str) -> Result<SessionMetrics> {
        let mut sessions = self.inner.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        if session.is_active() {
            session.complete(self.inner.clock.now());
            tracing::info!(
                session_id = %session_id,
                duration_ms = session.duration_ms.unwrap_or_default(),
                samples = session.sample_count,
                "Metrics session ended"
            );
        }
        Ok(session.clone())
    }

    // ------------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------------

    pub async fn record_sample(&self, session_id: &str, sample: MetricSample) -> Result<()> {
        tracing::trace!(session_id = %session_id, kind = %sample.kind, value = sample.value, "Sample recorded");
        self.inner
            .update_active(session_id, |session| session.record(sample))
            .await?;
        exporter::record_sample(sample.kind.as_str());
        Ok(())
    }

    pub async fn record_latency(&self, session_id: &str, latency_ms: f64) -> Result<()> {
        self.record_sample(session_id, MetricSample::new(SampleKind::Latency, latency_ms))
            .await
    }

    pub async fn record_bandwidth(&self, session_id: &str, bandwidth_mbps: f64) -> Result<()> {
        self.record_sample(session_id, MetricSample::new(SampleKind::Bandwidth, bandwidth_mbps))
            .await
    }

    pub async fn record_packet_loss(&self, session_id: &str, percent: f64) -> Result<()> {
        self.record_sample(session_id, MetricSample::new(SampleKind::PacketLoss, percent))
            .await
    }

    pub async fn record_jitter(&self, session_id: &str, jitter_ms: f64) -> Result<()> {
        self.record_sample(session_id, MetricSample::new(SampleKind::Jitter, jitter_ms))
            .await
    }

    pub async fn record_frames_dropped(&self, session_id: &str, count: u64) -> Result<()> {
        self.inner
            .update_active(session_id, |session| session.frames_dropped += count)
            .await
    }

    pub async fn record_packets_lost(&self, session_id: &str, count: u64) -> Result<()> {
        self.inner
            .update_active(session_id, |session| session.packets_lost += count)
            .await
    }

    /// Count one sent packet of `bytes`
    pub async fn record_packet_sent(&self, session_id: &str, bytes: u64) -> Result<()> {
        self.inner
            .update_active(session_id, |session| {
                session.packets_sent += 1;
                session.bytes_transferred += bytes;
            })
            .await
    }

    // ------------------------------------------------------------------------
    // Queries and eviction
    // ------------------------------------------------------------------------

    pub async fn session_metrics(&self, session_id: &str) -> Option<SessionMetrics> {
        self.inner.sessions.read().await.get(session_id).cloned()
    }

    pub async fn all_sessions(&self) -> Vec<SessionMetrics> {
        self.inner.sessions.read().await.values().cloned().collect()
    }

    pub async fn active_sessions(&self) -> Vec<SessionMetrics> {
        self.inner
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.is_active())
            .cloned()
            .collect()
    }

    /// Last aggregation snapshot
    pub async fn global_metrics(&self) -> GlobalMetrics {
        self.inner.global.read().await.clone()
    }

    /// Sessions sorted descending by `sort_by`
    pub async fn top_sessions(&self, sort_by: SessionSortKey, limit: usize) -> Vec<SessionMetrics> {
        let now = self.inner.clock.now();
        let mut sessions = self.all_sessions().await;

        let key = |s: &SessionMetrics| match sort_by {
            SessionSortKey::Latency => s.latency.avg,
            SessionSortKey::Bandwidth => s.bandwidth.avg,
            SessionSortKey::Duration => s.elapsed_ms(now),
        };
        sessions.sort_by(|a, b| key(b).total_cmp(&key(a)));
        sessions.truncate(limit);
        sessions
    }

    pub async fn clear_session(&self, session_id: &str) -> bool {
        self.inner.sessions.write().await.remove(session_id).is_some()
    }

    /// Evict completed sessions that ended more than `age` ago
    pub async fn clear_old_sessions(&self, age: Duration) -> usize {
        let age = chrono::Duration::from_std(age).unwrap_or(chrono::Duration::MAX);
        let cutoff = self.inner.clock.now().checked_sub_signed(age);

        let mut sessions = self.inner.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| match (s.end_time, cutoff) {
            (Some(end), Some(cutoff)) => end >= cutoff,
            _ => true,
        });

        let removed = before - sessions.len();
        if removed > 0 {
            tracing::debug!(removed, "Evicted old sessions");
        }
        removed
    }
}
