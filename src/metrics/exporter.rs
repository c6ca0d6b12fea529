//! Prometheus metrics for the edgepulse adapter
//!
//! This module tracks:
//! - Network: detections, current latency/bandwidth/quality
//! - Edge: registry size, online nodes, health check outcomes
//! - Sessions: starts/ends, recorded samples, quality changes, warnings
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for network metrics
struct NetworkMetrics {
    detections: CounterVec,
    detection_duration: HistogramVec,
    latency_ms: Gauge,
    bandwidth_mbps: Gauge,
    quality_score: Gauge,
}

/// Container for edge and session metrics
struct EdgeMetrics {
    registered_nodes: Gauge,
    online_nodes: Gauge,
    health_checks: CounterVec,
    active_sessions: Gauge,
    sessions: CounterVec,
    samples: CounterVec,
    quality_changes: CounterVec,
    warnings: CounterVec,
}

/// Global storage for network metrics
static NETWORK_METRICS: OnceLock<NetworkMetrics> = OnceLock::new();

/// Global storage for edge/session metrics
static EDGE_METRICS: OnceLock<EdgeMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Safe to call more than once; only the first call registers anything.
///
/// ```ignore
/// if let Err(e) = edgepulse::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let network = NetworkMetrics {
        detections: register_counter_vec!(
            "edgepulse_network_detections_total",
            "Network detection cycles by outcome",
            &["outcome"]
        )?,
        detection_duration: register_histogram_vec!(
            "edgepulse_network_detection_duration_seconds",
            "Time spent in one detection cycle",
            &["outcome"],
            vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
        )?,
        latency_ms: register_gauge!(
            "edgepulse_network_latency_ms",
            "Last detected network latency in milliseconds"
        )?,
        bandwidth_mbps: register_gauge!(
            "edgepulse_network_bandwidth_mbps",
            "Last detected network bandwidth in Mbps"
        )?,
        quality_score: register_gauge!(
            "edgepulse_network_quality_score",
            "Network quality score (0-100)"
        )?,
    };

    let edge = EdgeMetrics {
        registered_nodes: register_gauge!(
            "edgepulse_edge_registered_nodes",
            "Number of edge nodes in the registry"
        )?,
        online_nodes: register_gauge!(
            "edgepulse_edge_online_nodes",
            "Number of online edge nodes"
        )?,
        health_checks: register_counter_vec!(
            "edgepulse_edge_health_checks_total",
            "Edge node health checks by outcome",
            &["outcome"]
        )?,
        active_sessions: register_gauge!(
            "edgepulse_active_sessions",
            "Number of active streaming sessions"
        )?,
        sessions: register_counter_vec!(
            "edgepulse_sessions_total",
            "Session lifecycle events",
            &["event"]
        )?,
        samples: register_counter_vec!(
            "edgepulse_samples_total",
            "Recorded session samples by kind",
            &["kind"]
        )?,
        quality_changes: register_counter_vec!(
            "edgepulse_quality_changes_total",
            "Quality level changes by target level",
            &["level"]
        )?,
        warnings: register_counter_vec!(
            "edgepulse_warnings_total",
            "Adapter warnings by kind",
            &["kind"]
        )?,
    };

    NETWORK_METRICS.set(network).map_err(|_| "Network metrics already initialized")?;
    EDGE_METRICS.set(edge).map_err(|_| "Edge metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    NETWORK_METRICS.get().is_some() && EDGE_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

fn outcome(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

/// Record one detection cycle
pub fn record_detection(detected: bool, duration_secs: f64) {
    let Some(m) = NETWORK_METRICS.get() else {
        return;
    };

    let label = outcome(detected);
    m.detections.with_label_values(&[label]).inc();
    m.detection_duration
        .with_label_values(&[label])
        .observe(duration_secs);
}

/// Update the current network gauges
pub fn update_network(latency_ms: f64, bandwidth_mbps: f64, quality: u8) {
    if let Some(m) = NETWORK_METRICS.get() {
        m.latency_ms.set(latency_ms);
        m.bandwidth_mbps.set(bandwidth_mbps);
        m.quality_score.set(f64::from(quality));
    }
}

/// Update edge registry gauges
pub fn update_edge_nodes(registered: usize, online: usize) {
    if let Some(m) = EDGE_METRICS.get() {
        m.registered_nodes.set(registered as f64);
        m.online_nodes.set(online as f64);
    }
}

/// Record the outcome of a health check round
pub fn record_health_checks(healthy: usize, failed: usize) {
    let Some(m) = EDGE_METRICS.get() else {
        return;
    };

    if healthy > 0 {
        m.health_checks
            .with_label_values(&["success"])
            .inc_by(healthy as f64);
    }
    if failed > 0 {
        m.health_checks
            .with_label_values(&["failure"])
            .inc_by(failed as f64);
    }
}

/// Record a session start or end and the resulting active count
pub fn record_session_event(event: &str, active: usize) {
    if let Some(m) = EDGE_METRICS.get() {
        m.sessions.with_label_values(&[event]).inc();
        m.active_sessions.set(active as f64);
    }
}

/// Record one statistical sample
pub fn record_sample(kind: &str) {
    if let Some(m) = EDGE_METRICS.get() {
        m.samples.with_label_values(&[kind]).inc();
    }
}

/// Record a quality level change
pub fn record_quality_change(level: &str) {
    if let Some(m) = EDGE_METRICS.get() {
        m.quality_changes.with_label_values(&[level]).inc();
    }
}

/// Record an adapter warning
pub fn record_warning(kind: &str) {
    if let Some(m) = EDGE_METRICS.get() {
        m.warnings.with_label_values(&[kind]).inc();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ensure_metrics_initialized() {
        let _ = init_metrics();
    }

    #[test]
    fn test_init_metrics_is_idempotent() {
        assert!(init_metrics().is_ok());
        assert!(init_metrics().is_ok());
    }

    #[test]
    fn test_encode_metrics() {
        ensure_metrics_initialized();
        record_detection(true, 0.02);
        update_network(18.0, 120.0, 100);

        let text = encode_metrics().unwrap();
        assert!(text.contains("edgepulse_network_detections_total"));
        assert!(text.contains("edgepulse_network_quality_score"));
    }

    #[test]
    fn test_edge_and_session_recording() {
        ensure_metrics_initialized();
        update_edge_nodes(4, 3);
        record_health_checks(3, 1);
        record_session_event("started", 1);
        record_sample("latency");
        record_quality_change("high-def");
        record_warning("high_latency");
        assert!(metrics_initialized());
    }
}
