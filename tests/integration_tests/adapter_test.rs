//! Adapter lifecycle, session and monitoring scenarios

use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use edgepulse::adapter::{AdapterEvent, WarningKind};
use edgepulse::config::AdapterConfig;
use edgepulse::edge::SelectionCriteria;
use edgepulse::metrics::SessionStatus;
use edgepulse::quality::QualityLevel;
use edgepulse::Error;

use crate::common::{node, Harness};

fn drain(events: &mut tokio::sync::broadcast::Receiver<AdapterEvent>) -> Vec<AdapterEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

fn fast_monitor_config() -> AdapterConfig {
    AdapterConfig::builder()
        .status_interval_secs(1)
        .detection_interval_secs(1)
        .build()
        .unwrap()
}

// ============================================================================
// Session lifecycle
// ============================================================================

#[tokio::test]
async fn test_end_to_end_session() {
    let h = Harness::new(vec![node("n1", "us-east", 15.0, 1_000, 500)]);
    h.adapter.start().await.unwrap();

    let ctx = h.adapter.start_session("s1").await.unwrap();
    assert_eq!(ctx.edge_node_id, "n1");
    assert_eq!(ctx.edge_region, "us-east");
    assert!(ctx.alternative_node_ids.is_empty());

    let status = h.adapter.status().await;
    let session = status.session.expect("active session in status");
    assert_eq!(session.session_id, "s1");
    assert!(status.session_metrics.unwrap().is_active());

    for _ in 0..5 {
        assert!(h.adapter.record_metric("latency", &json!(25)).await);
    }
    let metrics = h.adapter.session_metrics("s1").await.unwrap();
    assert_eq!(metrics.sample_count, 5);
    assert!((metrics.latency.avg - 25.0).abs() < 1e-9);
    assert_eq!(metrics.latency.min, 25.0);
    assert_eq!(metrics.latency.max, 25.0);

    h.clock.advance(chrono::Duration::milliseconds(250));
    let finished = h.adapter.end_session().await.unwrap();
    assert_eq!(finished.status, SessionStatus::Completed);
    assert!(finished.duration_ms.unwrap() > 0.0);
    assert!(h.adapter.current_session().await.is_none());

    h.adapter.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_ends_active_session() {
    let h = Harness::new(vec![node("n1", "us-east", 15.0, 1_000, 500)]);
    let mut events = h.adapter.subscribe();

    h.adapter.start().await.unwrap();
    h.adapter.start_session("s1").await.unwrap();
    h.adapter.stop().await.unwrap();

    let events = drain(&mut events);
    assert!(matches!(events.first(), Some(AdapterEvent::Started)));
    assert!(matches!(events.last(), Some(AdapterEvent::Stopped)));
    assert!(events.iter().any(|e| matches!(
        e,
        AdapterEvent::SessionEnded { session_id, metrics: Some(m) }
            if session_id == "s1" && m.status == SessionStatus::Completed
    )));

    let metrics = h.adapter.session_metrics("s1").await.unwrap();
    assert!(!metrics.is_active());
    assert!(h.adapter.edge_manager().connected_nodes().await.is_empty());
}

#[tokio::test]
async fn test_second_session_rejected_until_first_ends() {
    let h = Harness::new(vec![node("n1", "us-east", 15.0, 1_000, 500)]);
    h.adapter.start().await.unwrap();

    h.adapter.start_session("s1").await.unwrap();
    let err = h.adapter.start_session("s2").await.unwrap_err();
    assert!(matches!(err, Error::SessionAlreadyActive(_)));

    h.adapter.end_session().await;
    let ctx = h.adapter.start_session("s2").await.unwrap();
    assert_eq!(ctx.session_id, "s2");

    h.adapter.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_end_during_slow_connect_releases_node() {
    let h = Harness::new(vec![node("n1", "us-east", 15.0, 1_000, 500)]);
    h.adapter.start().await.unwrap();
    h.directory.set_connect_delay(Some(Duration::from_millis(200)));

    let (started, ended) = tokio::join!(h.adapter.start_session("s1"), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.adapter.end_session().await
    });

    assert_eq!(started.unwrap().session_id, "s1");
    let ended = ended.expect("end waits for the session to be bound");
    assert_eq!(ended.session_id, "s1");
    assert!(h.adapter.current_session().await.is_none());
    assert!(h.adapter.edge_manager().connected_nodes().await.is_empty());

    // The released slot is usable again
    h.directory.set_connect_delay(None);
    h.adapter.start_session("s2").await.unwrap();
    assert_eq!(h.adapter.edge_manager().connected_nodes().await, vec!["n1".to_string()]);

    h.adapter.stop().await.unwrap();
}

#[tokio::test]
async fn test_failed_connection_still_starts_session() {
    let h = Harness::new(vec![node("n1", "us-east", 15.0, 1_000, 500)]);
    h.directory.refuse_connections(true);

    let warnings = Arc::new(Mutex::new(Vec::new()));
    let sink = warnings.clone();
    h.adapter.on_warning(move |w| sink.lock().unwrap().push(w.kind));

    h.adapter.start().await.unwrap();
    let ctx = h.adapter.start_session("s1").await.unwrap();
    assert_eq!(ctx.edge_node_id, "n1");
    assert!(h.adapter.edge_manager().connected_nodes().await.is_empty());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(warnings.lock().unwrap().contains(&WarningKind::EdgeConnectionFailed));

    h.adapter.stop().await.unwrap();
}

#[tokio::test]
async fn test_metrics_collection_disabled() {
    let config = AdapterConfig::builder()
        .enable_metrics_collection(false)
        .build()
        .unwrap();
    let h = Harness::with_config(config, vec![node("n1", "us-east", 15.0, 1_000, 500)]);

    h.adapter.start().await.unwrap();
    assert!(!h.adapter.collector().is_running().await);

    h.adapter.start_session("s1").await.unwrap();
    assert!(!h.adapter.record_metric("latency", &json!(25)).await);

    let status = h.adapter.status().await;
    assert!(status.session.is_some());
    assert!(status.session_metrics.is_none());
    assert!(status.global_metrics.is_none());

    assert!(h.adapter.end_session().await.is_none());
    h.adapter.stop().await.unwrap();
}

// ============================================================================
// Lifecycle failures
// ============================================================================

#[tokio::test]
async fn test_start_rolls_back_on_subsystem_failure() {
    let h = Harness::new(vec![node("n1", "us-east", 15.0, 1_000, 500)]);

    h.adapter.edge_manager().start().await.unwrap();

    let err = h.adapter.start().await.unwrap_err();
    assert!(matches!(err, Error::AlreadyRunning { .. }));
    assert!(!h.adapter.is_started());
    assert!(!h.adapter.detector().is_running().await);
    assert!(!h.adapter.collector().is_running().await);

    h.adapter.edge_manager().stop().await.unwrap();
    h.adapter.start().await.unwrap();
    assert!(h.adapter.is_started());
    h.adapter.stop().await.unwrap();
}

#[tokio::test]
async fn test_adapt_quality_requires_reading() {
    let h = Harness::new(vec![node("n1", "us-east", 15.0, 1_000, 500)]);
    h.probe.set_failing(true);

    h.adapter.start().await.unwrap();
    let err = h.adapter.adapt_quality().await.unwrap_err();
    assert!(matches!(err, Error::NoNetworkReading));

    h.probe.set_failing(false);
    assert!(h.adapter.detect_network(Duration::from_secs(1)).await.unwrap().detected);
    assert_eq!(h.adapter.adapt_quality().await.unwrap(), QualityLevel::UltraHd);

    h.adapter.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_detect_network_timeout() {
    let h = Harness::new(vec![]);
    h.probe.set_delay(Some(Duration::from_secs(1)));

    let err = h
        .adapter
        .detect_network(Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { operation: "detect_network", .. }));

    h.probe.set_delay(None);
    let result = h.adapter.detect_network(Duration::from_millis(100)).await.unwrap();
    assert!(result.detected);
    assert_eq!(result.status.network_type, edgepulse::network::NetworkType::FiveG);
}

// ============================================================================
// Node selection
// ============================================================================

#[tokio::test]
async fn test_preferred_region_beats_lower_latency() {
    let h = Harness::new(vec![
        node("fast", "us-east", 10.0, 1_000, 500),
        node("near", "eu-west", 40.0, 1_000, 500),
    ]);
    let edge = h.adapter.edge_manager();
    edge.refresh_nodes().await.unwrap();

    let default = edge.select_node(&SelectionCriteria::for_session()).await.unwrap();
    assert_eq!(default.node.id, "fast");

    let preferred = edge
        .select_node(&SelectionCriteria::for_session().with_preferred_region("eu-west"))
        .await
        .unwrap();
    assert_eq!(preferred.node.id, "near");
    assert_eq!(preferred.alternatives[0].id, "fast");
}

// ============================================================================
// Monitoring
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_monitor_emits_threshold_warnings() {
    let h = Harness::with_config(fast_monitor_config(), vec![node("n1", "us-east", 15.0, 1_000, 500)]);
    h.probe.set_link(120.0, 2.0);

    let warnings = Arc::new(Mutex::new(Vec::new()));
    let sink = warnings.clone();
    h.adapter.on_warning(move |w| sink.lock().unwrap().push(w.kind));

    let statuses = Arc::new(Mutex::new(0usize));
    let counter = statuses.clone();
    h.adapter.on_status(move |_| *counter.lock().unwrap() += 1);

    h.adapter.start().await.unwrap();
    h.adapter.start_session("s1").await.unwrap();
    assert!(h.adapter.record_metric("packetLoss", &json!(9.0)).await);

    tokio::time::sleep(Duration::from_millis(1_500)).await;

    let kinds = warnings.lock().unwrap().clone();
    assert!(kinds.contains(&WarningKind::HighLatency));
    assert!(kinds.contains(&WarningKind::LowBandwidth));
    assert!(kinds.contains(&WarningKind::HighPacketLoss));

    // One snapshot on start, one per tick
    assert!(*statuses.lock().unwrap() >= 2);

    h.adapter.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_auto_quality_follows_network() {
    let h = Harness::with_config(fast_monitor_config(), vec![node("n1", "us-east", 15.0, 1_000, 500)]);
    h.adapter.start().await.unwrap();
    h.adapter.start_session("s1").await.unwrap();
    assert_eq!(h.adapter.quality_level().await, QualityLevel::Auto);

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(h.adapter.quality_level().await, QualityLevel::UltraHd);
    assert_eq!(h.adapter.current_session().await.unwrap().quality, QualityLevel::UltraHd);

    // Degraded link inside the debounce window keeps the level
    h.probe.set_link(200.0, 2.0);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.adapter.quality_level().await, QualityLevel::UltraHd);

    h.clock.advance(chrono::Duration::seconds(3));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.adapter.quality_level().await, QualityLevel::Low);
    assert_eq!(h.adapter.current_session().await.unwrap().quality, QualityLevel::Low);

    let history = h.adapter.quality_history().await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].to, QualityLevel::Low);

    h.adapter.stop().await.unwrap();
}

#[tokio::test]
async fn test_health_reflects_registry() {
    let h = Harness::new(vec![]);
    h.adapter.start().await.unwrap();
    assert!(!h.adapter.is_healthy().await);
    assert!(!h.adapter.status().await.healthy);

    h.directory.set_nodes(vec![node("n1", "us-east", 15.0, 1_000, 500)]);
    h.adapter.edge_manager().refresh_nodes().await.unwrap();
    assert!(h.adapter.is_healthy().await);
    assert_eq!(h.adapter.edge_nodes().await.len(), 1);

    h.adapter.stop().await.unwrap();
}
