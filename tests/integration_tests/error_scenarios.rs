//! REST collaborator scenarios against a mock telemetry server
//!
//! Tests the HTTP client and the adapter wired to it:
//! 1. Successful measurements and node listing
//! 2. Rejected envelopes and HTTP error statuses
//! 3. Malformed bodies
//! 4. Timeouts and retries

use std::time::Duration;

use edgepulse::adapter::Adapter;
use edgepulse::api::{ApiClient, ClientConfig, ClientError, MetricsReporter, NetworkProbe, NodeDirectory};
use edgepulse::config::AdapterConfig;
use edgepulse::edge::EdgeNodeStatus;
use edgepulse::error::ErrorCategory;
use edgepulse::metrics::SessionMetrics;
use edgepulse::network::NetworkType;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::fixtures::{
    bandwidth_body, latency_body, link_status_body, nodes_body, ok_body, rejected_body, MALFORMED_BODY,
};

async fn mount_get(server: &MockServer, route: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_probe(server: &MockServer, latency_ms: f64, bandwidth_mbps: f64) {
    mount_get(server, "/api/network/status", link_status_body()).await;
    mount_get(server, "/api/network/latency", latency_body(latency_ms)).await;
    mount_get(server, "/api/network/bandwidth", bandwidth_body(bandwidth_mbps)).await;
}

fn client(server: &MockServer) -> ApiClient {
    ApiClient::new(ClientConfig::new(server.uri()).with_timeout(Duration::from_secs(2))).unwrap()
}

// ============================================================================
// Success paths
// ============================================================================

#[tokio::test]
async fn test_probe_measurements() {
    let server = MockServer::start().await;
    mount_probe(&server, 12.5, 150.0).await;

    let client = client(&server);
    let link = client.link_status().await.unwrap();
    assert!(link.connected);
    assert_eq!(link.signal_strength, -68);
    assert_eq!(client.measure_latency().await.unwrap(), 12.5);
    assert_eq!(client.measure_bandwidth().await.unwrap(), 150.0);
}

#[tokio::test]
async fn test_fetch_nodes_applies_defaults() {
    let server = MockServer::start().await;
    mount_get(&server, "/api/edge/nodes", nodes_body()).await;

    let nodes = client(&server).fetch_nodes().await.unwrap();
    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[0].country, "DE");
    assert_eq!(nodes[1].country, "");
    assert_eq!(nodes[1].status, EdgeNodeStatus::Degraded);
    assert!(nodes[1].last_checked.is_none());
}

#[tokio::test]
async fn test_adapter_over_rest() {
    let server = MockServer::start().await;
    mount_probe(&server, 12.0, 150.0).await;
    mount_get(&server, "/api/edge/nodes", nodes_body()).await;

    Mock::given(method("POST"))
        .and(path("/api/edge/nodes/edge-fra-1/connect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/metrics/sessions/call-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
        .expect(1..)
        .mount(&server)
        .await;

    let config = AdapterConfig::builder().api_base_url(server.uri()).build().unwrap();
    let adapter = Adapter::from_api(config).unwrap();
    adapter.start().await.unwrap();

    let status = adapter.status().await;
    assert!(status.has_network_reading);
    assert_eq!(status.network.network_type, NetworkType::FiveG);
    assert_eq!(status.edge.total_nodes, 2);

    let ctx = adapter.start_session("call-7").await.unwrap();
    assert_eq!(ctx.edge_node_id, "edge-fra-1");
    assert_eq!(adapter.edge_manager().connected_nodes().await, vec!["edge-fra-1".to_string()]);

    let global = adapter.collector().aggregate_now().await;
    assert_eq!(global.active_sessions, 1);

    adapter.end_session().await;
    adapter.stop().await.unwrap();
    server.verify().await;
}

// ============================================================================
// Error paths
// ============================================================================

#[tokio::test]
async fn test_rejected_envelope() {
    let server = MockServer::start().await;
    mount_get(&server, "/api/edge/nodes", rejected_body("directory rebuilding")).await;

    let err = client(&server).fetch_nodes().await.unwrap_err();
    assert!(matches!(err, ClientError::Unavailable(ref msg) if msg == "directory rebuilding"));
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn test_http_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/network/latency"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/network/bandwidth"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client(&server);

    let err = client.measure_latency().await.unwrap_err();
    assert!(matches!(err, ClientError::HttpError { status: 503, ref message } if message == "overloaded"));
    assert!(err.is_recoverable());

    let err = client.measure_bandwidth().await.unwrap_err();
    assert!(matches!(err, ClientError::HttpError { status: 404, .. }));
    assert!(!err.is_recoverable());
}

#[tokio::test]
async fn test_malformed_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/network/status"))
        .respond_with(ResponseTemplate::new(200).set_body_string(MALFORMED_BODY))
        .mount(&server)
        .await;

    let err = client(&server).link_status().await.unwrap_err();
    assert!(matches!(err, ClientError::ParseError(_)));
    assert!(!err.is_recoverable());
}

#[tokio::test]
async fn test_timeout_handling() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/network/latency"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(latency_body(10.0))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let client = ApiClient::new(ClientConfig::new(server.uri()).with_timeout(Duration::from_millis(100))).unwrap();
    let err = client.measure_latency().await.unwrap_err();
    assert!(matches!(err, ClientError::Timeout));
}

#[tokio::test]
async fn test_retry_recovers_from_transient_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/metrics/sessions/s1"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/metrics/sessions/s1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
        .mount(&server)
        .await;

    let client = ApiClient::new(
        ClientConfig::new(server.uri())
            .with_retry_count(1)
            .with_retry_delay(Duration::from_millis(10)),
    )
    .unwrap();

    let metrics = SessionMetrics::new("s1", "n1", chrono::Utc::now());
    client.report_session(&metrics).await.unwrap();
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_adapter_start_survives_unreachable_api() {
    let config = AdapterConfig::builder()
        .api_base_url("http://127.0.0.1:1")
        .request_timeout_ms(200)
        .build()
        .unwrap();
    let adapter = Adapter::from_api(config).unwrap();

    adapter.start().await.unwrap();
    let status = adapter.status().await;
    assert!(!status.has_network_reading);
    assert_eq!(status.edge.total_nodes, 0);
    assert!(!status.healthy);

    let err = adapter.start_session("s1").await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Absence);

    adapter.stop().await.unwrap();
}
