//! Session metrics and Prometheus export
//!
//! - [`session`] - per-session series and the global snapshot
//! - [`collector`] - [`MetricsCollector`], the async owner of session records
//! - [`exporter`] - process-wide Prometheus gauges and counters

pub mod collector;
pub mod exporter;
pub mod session;

pub use collector::{CollectorConfig, MetricsCollector};
pub use exporter::{encode_metrics, init_metrics, metrics_initialized};
pub use session::{
    GlobalMetrics, MetricSample, MetricSeries, SampleKind, SessionMetrics, SessionSortKey,
    SessionStatus,
};
