//! Port interfaces for proxy persistence and probing

use std::time::Duration;

use async_trait::async_trait;
use scrapeshield_domain::{Proxy, ProxyRecord, Result};

/// Persisted proxy list
#[async_trait]
pub trait ProxyStore: Send + Sync {
    /// Load every stored proxy in stored order
    async fn load(&self) -> Result<Vec<ProxyRecord>>;

    /// Replace the stored list
    async fn save(&self, records: &[ProxyRecord]) -> Result<()>;
}

/// Outcome of one health probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub ok: bool,
    pub response_time: Duration,
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn success(response_time: Duration) -> Self {
        Self { ok: true, response_time, error: None }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self { ok: false, response_time: Duration::ZERO, error: Some(error.into()) }
    }
}

/// Connectivity check routed through a proxy
#[async_trait]
pub trait ProxyProbe: Send + Sync {
    /// Fetch `test_url` through `proxy` within `timeout`
    ///
    /// Transport failures are reported in the result, not as errors.
    async fn probe(&self, proxy: &Proxy, test_url: &str, timeout: Duration) -> ProbeResult;
}
