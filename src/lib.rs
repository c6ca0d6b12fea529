//! edgepulse - Adaptive network and edge coordination
//!
//! Keeps a real-time session on the best available path: measures the local
//! link, tracks a fleet of edge nodes, picks a media quality level that fits
//! current conditions and collects per-session transport metrics.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`adapter`] - Top-level coordinator owning every other component
//! - [`network`] - Link classification, quality scoring and the periodic detector
//! - [`edge`] - Edge node registry, health checks and node selection
//! - [`quality`] - Quality profile catalog and adaptive selection
//! - [`metrics`] - Session metrics, global aggregation and Prometheus export
//! - [`api`] - Telemetry collaborator traits, REST client and simulation
//! - [`config`] - Configuration management and settings
//! - [`error`] - Unified error type
//!
//! # Example
//!
//! ```no_run
//! use edgepulse::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AdapterConfig::from_env();
//!     let adapter = Adapter::from_api(config)?;
//!     adapter.start().await?;
//!     println!("{}", adapter.status().await.summary());
//!     adapter.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod api;
pub mod clock;
pub mod config;
pub mod edge;
pub mod error;
pub mod metrics;
pub mod network;
pub mod observer;
pub mod quality;
pub mod task;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::adapter::{Adapter, AdapterBuilder, AdapterEvent, AdapterStatus, AdapterWarning, SessionContext};
    pub use crate::api::{MetricsReporter, NetworkProbe, NodeDirectory, SimulationProfile};
    pub use crate::config::AdapterConfig;
    pub use crate::edge::{EdgeNode, EdgeNodeStatus, SelectionCriteria};
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::metrics::{GlobalMetrics, SessionMetrics};
    pub use crate::network::{NetworkStatus, NetworkType};
    pub use crate::quality::{QualityLevel, QualityProfile};
}

// Direct re-exports for convenience
pub use adapter::Adapter;
pub use config::AdapterConfig;
pub use error::{Error, Result};
