//! Production wiring of the resilience services
//!
//! Attaches the file-backed stores named in configuration, the reqwest
//! health probe and a Prometheus collector to a
//! [`ResilienceServicesBuilder`].

use std::sync::Arc;

use scrapeshield_common::{MetricsCollector, SystemClock};
use scrapeshield_core::{ResilienceServices, ResilienceServicesBuilder};
use scrapeshield_domain::{Config, Result};
use tracing::info;

use crate::http::ReqwestProxyProbe;
use crate::observability::PrometheusMetrics;
use crate::persistence::{JsonCacheBackend, JsonProxyStore};

/// Built services plus the collector they report to.
pub struct InfraServices {
    pub services: ResilienceServices<SystemClock>,
    pub metrics: Arc<PrometheusMetrics>,
}

/// Builder preloaded with the adapters `config` asks for.
///
/// The proxy store and cache mirror are attached only when their paths are
/// set; the health probe is always attached.
pub fn services_builder(
    config: Config,
    metrics: Arc<dyn MetricsCollector>,
) -> ResilienceServicesBuilder<SystemClock> {
    let store_path = config.proxy_pool.store_path.clone();
    let persist_path = config.cache.persist_path.clone();

    let mut builder = ResilienceServices::builder(config)
        .metrics(metrics)
        .proxy_probe(Arc::new(ReqwestProxyProbe::new()));

    if let Some(path) = store_path {
        info!(path = %path.display(), "Using JSON proxy store");
        builder = builder.proxy_store(Arc::new(JsonProxyStore::new(path)));
    }
    if let Some(path) = persist_path {
        info!(path = %path.display(), "Using JSON cache mirror");
        builder = builder.cache_backend(Arc::new(JsonCacheBackend::new(path)));
    }
    builder
}

/// Build the services for `config` reporting into a fresh Prometheus
/// registry.
///
/// # Errors
/// Returns `ScrapeShieldError::Config` when `config` fails validation.
pub fn build_services(config: Config) -> Result<InfraServices> {
    let metrics = Arc::new(PrometheusMetrics::new());
    let collector: Arc<dyn MetricsCollector> = metrics.clone();
    let services = services_builder(config, collector).build()?;
    Ok(InfraServices { services, metrics })
}

/// Load configuration from the environment and files, then build.
///
/// # Errors
/// Propagates loader and validation errors.
pub fn build_from_environment() -> Result<InfraServices> {
    build_services(crate::config::load()?)
}
