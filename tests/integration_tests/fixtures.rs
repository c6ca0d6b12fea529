//! Test fixtures for integration tests
//!
//! Canned API envelopes served by the mock telemetry server

use serde_json::{json, Value};

/// Connected link with a good signal
pub fn link_status_body() -> Value {
    json!({
        "success": true,
        "data": { "connected": true, "signal_strength": -68, "network_type": "5G" }
    })
}

pub fn latency_body(latency_ms: f64) -> Value {
    json!({ "success": true, "data": { "latency_ms": latency_ms } })
}

pub fn bandwidth_body(bandwidth_mbps: f64) -> Value {
    json!({ "success": true, "data": { "bandwidth_mbps": bandwidth_mbps } })
}

/// Two nodes, one of them degraded
pub fn nodes_body() -> Value {
    json!({
        "success": true,
        "data": [
            {
                "id": "edge-fra-1",
                "region": "eu-central",
                "country": "DE",
                "endpoint": "https://fra-1.edge.test",
                "latency_ms": 14.0,
                "capacity": 1000,
                "available_capacity": 400,
                "status": "online"
            },
            {
                "id": "edge-ams-1",
                "region": "eu-west",
                "endpoint": "https://ams-1.edge.test",
                "latency_ms": 9.0,
                "capacity": 500,
                "available_capacity": 20,
                "status": "degraded"
            }
        ]
    })
}

pub fn ok_body() -> Value {
    json!({ "success": true, "data": null })
}

/// Envelope for a request the API rejected
pub fn rejected_body(message: &str) -> Value {
    json!({ "success": false, "data": null, "error": message })
}

/// Response that is not an API envelope at all
pub const MALFORMED_BODY: &str = "<html><body>502 Bad Gateway</body></html>";
