//! Observability abstractions and shared metric names

pub mod traits;

pub use traits::{InMemoryMetricsCollector, MetricsCollector, NoOpMetricsCollector};

/// Metric names emitted by the resilience services.
pub mod names {
    pub const ERRORS_TOTAL: &str = "scrape_errors_total";
    pub const RETRY_ATTEMPTS_TOTAL: &str = "scrape_retry_attempts_total";
    pub const RETRY_OUTCOMES_TOTAL: &str = "scrape_retry_outcomes_total";
    pub const RETRY_DELAY_MS: &str = "scrape_retry_delay_ms";
    pub const CIRCUIT_TRANSITIONS_TOTAL: &str = "scrape_circuit_transitions_total";
    pub const CIRCUIT_REJECTIONS_TOTAL: &str = "scrape_circuit_rejections_total";
    pub const PROXY_POOL_SIZE: &str = "scrape_proxy_pool_size";
    pub const PROXY_BANS_TOTAL: &str = "scrape_proxy_bans_total";
    pub const CACHE_REQUESTS_TOTAL: &str = "scrape_cache_requests_total";
    pub const CACHE_HIT_RATE: &str = "scrape_cache_hit_rate";
    pub const CACHE_EVICTIONS_TOTAL: &str = "scrape_cache_evictions_total";
    pub const CACHE_KEYS_HASHED_TOTAL: &str = "scrape_cache_keys_hashed_total";
}
