//! Network sensing: status snapshots, classification and quality scoring
//!
//! Bandwidth is expressed in Mbps throughout the crate and latency in
//! milliseconds.

pub mod detector;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use detector::{DetectionResult, DetectorConfig, NetworkDetector};

// ============================================================================
// Network Type
// ============================================================================

/// Radio/link technology of the current connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum NetworkType {
    #[serde(rename = "5G")]
    FiveG,
    #[serde(rename = "4G")]
    FourG,
    #[serde(rename = "WiFi")]
    Wifi,
    #[serde(rename = "LTE")]
    Lte,
    #[default]
    Unknown,
}

impl NetworkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FiveG => "5G",
            Self::FourG => "4G",
            Self::Wifi => "WiFi",
            Self::Lte => "LTE",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a link from its measured latency (ms) and bandwidth (Mbps)
///
/// 5G is checked first so a fast, low-latency link is never reported as WiFi.
pub fn determine_network_type(latency_ms: f64, bandwidth_mbps: f64) -> NetworkType {
    if latency_ms < 50.0 && bandwidth_mbps > 20.0 {
        NetworkType::FiveG
    } else if latency_ms < 150.0 && bandwidth_mbps > 5.0 {
        NetworkType::FourG
    } else if latency_ms > 0.0 {
        NetworkType::Wifi
    } else {
        NetworkType::Unknown
    }
}

// ============================================================================
// Network Status
// ============================================================================

/// Snapshot of the current network conditions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStatus {
    /// Classified link type
    #[serde(rename = "type")]
    pub network_type: NetworkType,

    /// Round-trip latency in milliseconds
    pub latency_ms: f64,

    /// Available bandwidth in Mbps
    pub bandwidth_mbps: f64,

    /// Signal strength in dBm (0 when unknown)
    pub signal_strength: i32,

    /// Whether the link is up
    pub connected: bool,

    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self {
            network_type: NetworkType::Unknown,
            latency_ms: 0.0,
            bandwidth_mbps: 0.0,
            signal_strength: 0,
            connected: false,
            timestamp: DateTime::<Utc>::default(),
        }
    }
}

impl NetworkStatus {
    /// Weighted 0-100 quality score of this snapshot
    pub fn quality_score(&self) -> u8 {
        network_quality_score(self)
    }
}

// ============================================================================
// Quality Scoring
// ============================================================================

/// Step score for latency, non-increasing as latency grows
pub fn latency_score(latency_ms: f64) -> f64 {
    match latency_ms {
        l if l < 20.0 => 100.0,
        l if l < 50.0 => 90.0,
        l if l < 100.0 => 75.0,
        l if l < 150.0 => 60.0,
        l if l < 300.0 => 40.0,
        _ => 20.0,
    }
}

/// Step score for bandwidth, non-decreasing as bandwidth grows
pub fn bandwidth_score(bandwidth_mbps: f64) -> f64 {
    match bandwidth_mbps {
        b if b >= 50.0 => 100.0,
        b if b >= 25.0 => 90.0,
        b if b >= 10.0 => 75.0,
        b if b >= 5.0 => 60.0,
        b if b >= 1.0 => 40.0,
        _ => 10.0,
    }
}

/// 40% latency score + 60% bandwidth score, 0 when disconnected
pub fn network_quality_score(status: &NetworkStatus) -> u8 {
    if !status.connected {
        return 0;
    }

    let score = 0.4 * latency_score(status.latency_ms) + 0.6 * bandwidth_score(status.bandwidth_mbps);
    score.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(latency_ms: f64, bandwidth_mbps: f64) -> NetworkStatus {
        NetworkStatus {
            network_type: determine_network_type(latency_ms, bandwidth_mbps),
            latency_ms,
            bandwidth_mbps,
            connected: true,
            timestamp: Utc::now(),
            ..Default::default()
        }
    }

    #[test]
    fn test_classification_precedence() {
        assert_eq!(determine_network_type(10.0, 100.0), NetworkType::FiveG);
        assert_eq!(determine_network_type(49.9, 20.1), NetworkType::FiveG);
        assert_eq!(determine_network_type(80.0, 10.0), NetworkType::FourG);
        assert_eq!(determine_network_type(200.0, 100.0), NetworkType::Wifi);
        assert_eq!(determine_network_type(0.0, 100.0), NetworkType::Unknown);
    }

    #[test]
    fn test_classification_boundaries_are_exact() {
        assert_eq!(determine_network_type(50.0, 100.0), NetworkType::FourG);
        assert_eq!(determine_network_type(10.0, 20.0), NetworkType::FourG);
        assert_eq!(determine_network_type(150.0, 100.0), NetworkType::Wifi);
        assert_eq!(determine_network_type(10.0, 5.0), NetworkType::Wifi);
    }

    #[test]
    fn test_quality_zero_when_disconnected() {
        let mut status = connected(5.0, 500.0);
        status.connected = false;
        assert_eq!(status.quality_score(), 0);
    }

    #[test]
    fn test_quality_blend() {
        // 0.4 * 100 + 0.6 * 100
        assert_eq!(connected(10.0, 80.0).quality_score(), 100);
        // 0.4 * 75 + 0.6 * 60 = 66
        assert_eq!(connected(80.0, 6.0).quality_score(), 66);
        // 0.4 * 20 + 0.6 * 10 = 14
        assert_eq!(connected(900.0, 0.2).quality_score(), 14);
    }

    #[test]
    fn test_network_type_serialization() {
        let json = serde_json::to_string(&NetworkType::FiveG).unwrap();
        assert_eq!(json, "\"5G\"");
        let parsed: NetworkType = serde_json::from_str("\"WiFi\"").unwrap();
        assert_eq!(parsed, NetworkType::Wifi);
    }

    #[test]
    fn test_default_status_is_unknown_disconnected() {
        let status = NetworkStatus::default();
        assert_eq!(status.network_type, NetworkType::Unknown);
        assert!(!status.connected);
        assert_eq!(status.quality_score(), 0);
    }
}
