//! Per-session and global metric records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::fmt;

// ============================================================================
// Metric Series
// ============================================================================

/// Ordered samples of one metric with derived aggregates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    values: Vec<f64>,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
}

impl MetricSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample and recompute the aggregates over the whole series
    pub fn push(&mut self, value: f64) {
        self.values.push(value);
        self.recompute();
    }

    fn recompute(&mut self) {
        if self.values.is_empty() {
            return;
        }

        self.avg = Statistics::mean(self.values.iter());
        self.min = Statistics::min(self.values.iter());
        self.max = Statistics::max(self.values.iter());
        self.std_dev = if self.values.len() > 1 {
            Statistics::std_dev(self.values.iter())
        } else {
            0.0
        };
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last(&self) -> Option<f64> {
        self.values.last().copied()
    }
}

// ============================================================================
// Samples
// ============================================================================

/// Statistical metric kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleKind {
    /// Round-trip latency (ms)
    Latency,
    /// Throughput (Mbps)
    Bandwidth,
    /// Packet loss (%)
    PacketLoss,
    /// Jitter (ms)
    Jitter,
}

impl SampleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Latency => "latency",
            Self::Bandwidth => "bandwidth",
            Self::PacketLoss => "packet_loss",
            Self::Jitter => "jitter",
        }
    }
}

impl fmt::Display for SampleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub kind: SampleKind,
    pub value: f64,
}

impl MetricSample {
    pub fn new(kind: SampleKind, value: f64) -> Self {
        Self { kind, value }
    }
}

// ============================================================================
// Session Metrics
// ============================================================================

/// Lifecycle state of a tracked session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Metrics of one streaming session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub session_id: String,
    pub edge_node_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,

    /// end - start in milliseconds, set on completion
    pub duration_ms: Option<f64>,

    pub latency: MetricSeries,
    pub bandwidth: MetricSeries,
    pub packet_loss: MetricSeries,
    pub jitter: MetricSeries,

    /// Statistical samples recorded (counters excluded)
    pub sample_count: u64,

    pub bytes_transferred: u64,
    pub packets_sent: u64,
    pub packets_lost: u64,
    pub frames_dropped: u64,

    pub status: SessionStatus,
}

impl SessionMetrics {
    /// Fresh active session
    pub fn new(session_id: impl Into<String>, edge_node_id: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            edge_node_id: edge_node_id.into(),
            start_time,
            end_time: None,
            duration_ms: None,
            latency: MetricSeries::new(),
            bandwidth: MetricSeries::new(),
            packet_loss: MetricSeries::new(),
            jitter: MetricSeries::new(),
            sample_count: 0,
            bytes_transferred: 0,
            packets_sent: 0,
            packets_lost: 0,
            frames_dropped: 0,
            status: SessionStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn series(&self, kind: SampleKind) -> &MetricSeries {
        match kind {
            SampleKind::Latency => &self.latency,
            SampleKind::Bandwidth => &self.bandwidth,
            SampleKind::PacketLoss => &self.packet_loss,
            SampleKind::Jitter => &self.jitter,
        }
    }

    /// Append a statistical sample
    pub fn record(&mut self, sample: MetricSample) {
        let series = match sample.kind {
            SampleKind::Latency => &mut self.latency,
            SampleKind::Bandwidth => &mut self.bandwidth,
            SampleKind::PacketLoss => &mut self.packet_loss,
            SampleKind::Jitter => &mut self.jitter,
        };
        series.push(sample.value);
        self.sample_count += 1;
    }

    /// Mark completed at `end_time`
    pub fn complete(&mut self, end_time: DateTime<Utc>) {
        self.end_time = Some(end_time);
        self.duration_ms = Some(millis_between(self.start_time, end_time));
        self.status = SessionStatus::Completed;
    }

    /// Duration if completed, otherwise time elapsed until `now`
    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> f64 {
        self.duration_ms
            .unwrap_or_else(|| millis_between(self.start_time, now))
    }
}

fn millis_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let delta = end.signed_duration_since(start);
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000.0,
        None => delta.num_milliseconds() as f64,
    }
}

/// Ordering key for `top_sessions`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionSortKey {
    Latency,
    Bandwidth,
    Duration,
}

// ============================================================================
// Global Metrics
// ============================================================================

/// Snapshot folding every tracked session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalMetrics {
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub completed_sessions: usize,

    /// Pairwise running average of completed session durations (ms)
    pub avg_session_duration_ms: f64,

    pub avg_latency_ms: f64,
    pub avg_bandwidth_mbps: f64,
    pub avg_packet_loss: f64,
    pub avg_jitter_ms: f64,

    /// Highest active count seen across aggregations
    pub peak_concurrent_sessions: usize,

    pub total_bytes_transferred: u64,

    /// Earliest session start among tracked sessions
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
}

impl GlobalMetrics {
    /// Fold `sessions` into a new snapshot
    pub fn aggregate<'a, I>(sessions: I, previous_peak: usize, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = &'a SessionMetrics>,
    {
        let mut sessions: Vec<&SessionMetrics> = sessions.into_iter().collect();
        sessions.sort_by_key(|s| s.start_time);

        let active = sessions.iter().filter(|s| s.is_active()).count();

        let avg_session_duration_ms = sessions
            .iter()
            .filter_map(|s| s.duration_ms)
            .fold(None, |avg: Option<f64>, d| Some(avg.map_or(d, |a| (a + d) / 2.0)))
            .unwrap_or(0.0);

        let mean_of = |kind: SampleKind| -> f64 {
            let averages: Vec<f64> = sessions
                .iter()
                .map(|s| s.series(kind))
                .filter(|series| !series.is_empty())
                .map(|series| series.avg)
                .collect();
            if averages.is_empty() {
                0.0
            } else {
                Statistics::mean(averages.iter())
            }
        };

        Self {
            total_sessions: sessions.len(),
            active_sessions: active,
            completed_sessions: sessions.len() - active,
            avg_session_duration_ms,
            avg_latency_ms: mean_of(SampleKind::Latency),
            avg_bandwidth_mbps: mean_of(SampleKind::Bandwidth),
            avg_packet_loss: mean_of(SampleKind::PacketLoss),
            avg_jitter_ms: mean_of(SampleKind::Jitter),
            peak_concurrent_sessions: previous_peak.max(active),
            total_bytes_transferred: sessions.iter().map(|s| s.bytes_transferred).sum(),
            window_start: sessions.first().map(|s| s.start_time),
            window_end: Some(now),
        }
    }
}
