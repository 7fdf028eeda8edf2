//! Shared runtime utilities for ScrapeShield crates.
//!
//! - [`resilience`]: injectable clocks and capped, jittered backoff
//! - [`observability`]: the metrics sink trait and in-process collectors
//! - [`lifecycle`]: interval-driven background tasks with explicit stop

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use lifecycle::{JobError, PeriodicJob, PeriodicTask, PeriodicTaskConfig, TaskError};
pub use observability::{InMemoryMetricsCollector, MetricsCollector, NoOpMetricsCollector};
pub use resilience::{Backoff, BackoffError, Clock, MockClock, SystemClock};
