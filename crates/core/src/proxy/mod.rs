//! Proxy pool: selection, scoring, bans and health checks

mod health;
mod manager;
pub mod ports;
pub mod scoring;
pub mod selection;

pub use health::{HealthCheckJob, HealthReport, ProxyFlushJob};
pub use manager::{ProxyManager, ProxyRequest};
pub use ports::{ProbeResult, ProxyProbe, ProxyStore};
