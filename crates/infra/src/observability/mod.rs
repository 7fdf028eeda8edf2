//! Observability infrastructure for logging and metrics export
//!
//! - [`logging`]: global `tracing` subscriber installation
//! - [`metrics`]: a [`MetricsCollector`](scrapeshield_common::MetricsCollector)
//!   rendering the Prometheus text format

pub mod logging;
pub mod metrics;

pub use logging::{init_tracing, LogFormat};
pub use metrics::PrometheusMetrics;
