//! # ScrapeShield Infrastructure
//!
//! Infrastructure implementations of core resilience ports.
//!
//! This crate contains:
//! - Configuration loading from files and `SCRAPESHIELD_*` variables
//! - JSON file persistence for the proxy list and the cache mirror
//! - An HTTP health probe routed through each proxy
//! - Tracing subscriber setup and a Prometheus metrics collector
//!
//! ## Architecture
//! - Implements traits defined in `scrapeshield-core`
//! - Depends on `scrapeshield-common`, `scrapeshield-domain` and
//!   `scrapeshield-core`
//! - Contains all "impure" code (file system, network, global subscribers)

#![forbid(unsafe_code)]

pub mod bootstrap;
pub mod config;
pub mod errors;
pub mod http;
pub mod observability;
pub mod persistence;

// Re-export commonly used items
pub use bootstrap::{build_from_environment, build_services, services_builder, InfraServices};
pub use errors::InfraError;
pub use http::ReqwestProxyProbe;
pub use observability::{init_tracing, LogFormat, PrometheusMetrics};
pub use persistence::{JsonCacheBackend, JsonProxyStore};
