//! Streaming quality catalog and adaptive selection
//!
//! Levels form a ladder from [`QualityLevel::UltraHd`] down to
//! [`QualityLevel::Low`]. [`QualityLevel::Auto`] is a placeholder meaning
//! "not decided yet" and is never picked by the adaptive strategy.

pub mod selector;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub use selector::{QualitySelector, SelectorConfig};

// ============================================================================
// Quality Level
// ============================================================================

/// Catalog key of a quality profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QualityLevel {
    UltraHd,
    HighDef,
    Standard,
    Medium,
    Low,
    Auto,
}

impl QualityLevel {
    /// Adaptive candidates, best first
    pub const LADDER: [QualityLevel; 5] = [
        Self::UltraHd,
        Self::HighDef,
        Self::Standard,
        Self::Medium,
        Self::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UltraHd => "ultra-hd",
            Self::HighDef => "high-def",
            Self::Standard => "standard",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Auto => "auto",
        }
    }

    /// Position on the ladder, higher is better; `None` for auto
    pub fn rank(&self) -> Option<u8> {
        match self {
            Self::UltraHd => Some(5),
            Self::HighDef => Some(4),
            Self::Standard => Some(3),
            Self::Medium => Some(2),
            Self::Low => Some(1),
            Self::Auto => None,
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ultra-hd" | "ultrahd" | "4k" => Ok(Self::UltraHd),
            "high-def" | "highdef" | "1080p" => Ok(Self::HighDef),
            "standard" | "720p" => Ok(Self::Standard),
            "medium" | "480p" => Ok(Self::Medium),
            "low" | "360p" => Ok(Self::Low),
            "auto" => Ok(Self::Auto),
            other => Err(Error::UnknownQualityLevel(other.to_string())),
        }
    }
}

// ============================================================================
// Quality Profile
// ============================================================================

/// Encoding parameters and network requirements of one level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityProfile {
    pub name: String,
    pub bitrate_kbps: u32,
    pub resolution: String,
    pub fps: u32,
    pub codec: String,

    /// Highest tolerable latency (ms); `None` is unbounded
    pub max_latency_ms: Option<f64>,

    /// Lowest required bandwidth (Mbps)
    pub min_bandwidth_mbps: f64,
}

impl QualityProfile {
    pub fn new(
        name: impl Into<String>,
        bitrate_kbps: u32,
        resolution: impl Into<String>,
        fps: u32,
        codec: impl Into<String>,
        max_latency_ms: Option<f64>,
        min_bandwidth_mbps: f64,
    ) -> Self {
        Self {
            name: name.into(),
            bitrate_kbps,
            resolution: resolution.into(),
            fps,
            codec: codec.into(),
            max_latency_ms,
            min_bandwidth_mbps,
        }
    }

    /// Whether the given conditions satisfy both requirements
    pub fn is_satisfied_by(&self, latency_ms: f64, bandwidth_mbps: f64) -> bool {
        self.max_latency_ms.map_or(true, |max| latency_ms <= max)
            && bandwidth_mbps >= self.min_bandwidth_mbps
    }
}

/// Built-in catalog
pub fn default_profiles() -> BTreeMap<QualityLevel, QualityProfile> {
    BTreeMap::from([
        (
            QualityLevel::UltraHd,
            QualityProfile::new("Ultra HD 4K", 25_000, "3840x2160", 60, "h265", Some(30.0), 35.0),
        ),
        (
            QualityLevel::HighDef,
            QualityProfile::new("Full HD 1080p", 8_000, "1920x1080", 60, "h264", Some(50.0), 12.0),
        ),
        (
            QualityLevel::Standard,
            QualityProfile::new("HD 720p", 5_000, "1280x720", 30, "h264", Some(100.0), 7.0),
        ),
        (
            QualityLevel::Medium,
            QualityProfile::new("SD 480p", 2_500, "854x480", 30, "h264", Some(150.0), 4.0),
        ),
        (
            QualityLevel::Low,
            QualityProfile::new("Low 360p", 1_000, "640x360", 30, "h264", Some(300.0), 1.5),
        ),
        (
            QualityLevel::Auto,
            QualityProfile::new("Auto", 0, "adaptive", 0, "auto", None, 0.0),
        ),
    ])
}

// ============================================================================
// Adjustments
// ============================================================================

/// Why the active level changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    InsufficientBandwidth,
    HighLatency,
    PoorConditions,
    ExcellentConditions,
    GoodConditions,
    ConditionChange,
    ManualOverride,
}

impl AdjustmentReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InsufficientBandwidth => "insufficient bandwidth",
            Self::HighLatency => "high latency",
            Self::PoorConditions => "poor network conditions",
            Self::ExcellentConditions => "excellent network conditions",
            Self::GoodConditions => "good network conditions",
            Self::ConditionChange => "network condition change",
            Self::ManualOverride => "manual override",
        }
    }
}

impl fmt::Display for AdjustmentReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the adjustment history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAdjustment {
    pub from: QualityLevel,
    pub to: QualityLevel,
    pub reason: AdjustmentReason,
    pub timestamp: DateTime<Utc>,
}
