//! Configuration structures
//!
//! Every section has serde defaults, so an empty document yields a working
//! configuration. Durations are expressed in milliseconds.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::utils::serde::{duration_millis, option_duration_millis};
use crate::{ErrorKind, Result, RetryPolicy, ScrapeShieldError, SelectionStrategy};

/// Root configuration for all resilience services.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub classifier: ClassifierSettings,
    pub retry: RetrySettings,
    pub circuit_breaker: CircuitBreakerSettings,
    pub proxy_pool: ProxyPoolSettings,
    pub cache: CacheSettings,
}

impl Config {
    /// Rejects values that would disable a safety mechanism outright.
    pub fn validate(&self) -> Result<()> {
        if self.circuit_breaker.threshold == 0 {
            return Err(ScrapeShieldError::Config("circuit_breaker.threshold must be > 0".into()));
        }
        if self.circuit_breaker.reset_time.is_zero() {
            return Err(ScrapeShieldError::Config(
                "circuit_breaker.reset_time_ms must be > 0".into(),
            ));
        }
        if self.classifier.memo_capacity == 0 {
            return Err(ScrapeShieldError::Config("classifier.memo_capacity must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(ScrapeShieldError::Config(format!(
                "retry.jitter_factor must be within [0, 1], got {}",
                self.retry.jitter_factor
            )));
        }
        if self.proxy_pool.failure_threshold == 0 {
            return Err(ScrapeShieldError::Config("proxy_pool.failure_threshold must be > 0".into()));
        }
        if self.proxy_pool.health_check_concurrency == 0 {
            return Err(ScrapeShieldError::Config(
                "proxy_pool.health_check_concurrency must be > 0".into(),
            ));
        }
        if self.cache.max_items_per_domain == 0 {
            return Err(ScrapeShieldError::Config("cache.max_items_per_domain must be > 0".into()));
        }
        if let Some((domain, _)) = self.cache.domain_limits.iter().find(|(_, limit)| **limit == 0) {
            return Err(ScrapeShieldError::Config(format!(
                "cache.domain_limits.{domain} must be > 0"
            )));
        }
        for (kind, policy) in &self.retry.policy_overrides {
            if !policy.backoff_factor.is_finite() || policy.backoff_factor < 0.0 {
                return Err(ScrapeShieldError::Config(format!(
                    "retry.policy_overrides.{kind}.backoff_factor must be a non-negative number"
                )));
            }
        }
        Ok(())
    }
}

/// Error classifier tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// Maximum memoized classifications before the oldest fifth is dropped.
    pub memo_capacity: usize,
    /// Bodies shorter than this (trimmed, in bytes) classify as `CONTENT_EMPTY`.
    pub min_content_length: usize,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            memo_capacity: DEFAULT_CLASSIFIER_MEMO_CAPACITY,
            min_content_length: MIN_CONTENT_LENGTH,
        }
    }
}

/// Retry orchestration tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Upper bound on a single backoff delay.
    #[serde(rename = "max_delay_ms", with = "duration_millis")]
    pub max_delay: Duration,
    /// Relative jitter applied to each delay, e.g. 0.1 = ±10%.
    pub jitter_factor: f64,
    /// Timeout handed to the first attempt.
    #[serde(rename = "attempt_timeout_ms", with = "duration_millis")]
    pub attempt_timeout: Duration,
    /// Default overall deadline when a call does not set one.
    #[serde(rename = "max_duration_ms", with = "option_duration_millis")]
    pub max_duration: Option<Duration>,
    /// Replaces entries of the built-in policy table.
    pub policy_overrides: HashMap<ErrorKind, RetryPolicy>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            jitter_factor: DEFAULT_JITTER_FACTOR,
            attempt_timeout: Duration::from_millis(DEFAULT_ATTEMPT_TIMEOUT_MS),
            max_duration: None,
            policy_overrides: HashMap::new(),
        }
    }
}

/// Per-domain circuit breaker tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures that open the circuit.
    pub threshold: u32,
    /// Cool-down before a half-open probe is admitted.
    #[serde(rename = "reset_time_ms", with = "duration_millis")]
    pub reset_time: Duration,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_BREAKER_THRESHOLD,
            reset_time: Duration::from_millis(DEFAULT_BREAKER_RESET_MS),
        }
    }
}

/// Proxy pool tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyPoolSettings {
    pub strategy: SelectionStrategy,
    /// Consecutive failures that disable a proxy.
    pub failure_threshold: u32,
    /// Minimum time a disabled proxy sits out before it may be re-probed.
    #[serde(rename = "min_ban_duration_ms", with = "duration_millis")]
    pub min_ban_duration: Duration,
    #[serde(rename = "health_check_interval_ms", with = "duration_millis")]
    pub health_check_interval: Duration,
    pub health_check_url: String,
    #[serde(rename = "health_check_timeout_ms", with = "duration_millis")]
    pub health_check_timeout: Duration,
    pub health_check_concurrency: usize,
    /// Disabled proxies re-probed per health-check round.
    pub disabled_sample_size: usize,
    /// Below this many active proxies, backups are probed for promotion.
    pub min_active_proxies: usize,
    #[serde(rename = "flush_interval_ms", with = "duration_millis")]
    pub flush_interval: Duration,
    /// JSON file holding the proxy list; `None` keeps the pool in memory.
    pub store_path: Option<PathBuf>,
}

impl Default for ProxyPoolSettings {
    fn default() -> Self {
        Self {
            strategy: SelectionStrategy::default(),
            failure_threshold: DEFAULT_PROXY_FAILURE_THRESHOLD,
            min_ban_duration: Duration::from_millis(DEFAULT_MIN_BAN_MS),
            health_check_interval: Duration::from_millis(DEFAULT_HEALTH_CHECK_INTERVAL_MS),
            health_check_url: DEFAULT_HEALTH_CHECK_URL.to_string(),
            health_check_timeout: Duration::from_millis(DEFAULT_HEALTH_CHECK_TIMEOUT_MS),
            health_check_concurrency: DEFAULT_HEALTH_CHECK_CONCURRENCY,
            disabled_sample_size: DEFAULT_DISABLED_SAMPLE_SIZE,
            min_active_proxies: DEFAULT_MIN_ACTIVE_PROXIES,
            flush_interval: Duration::from_millis(DEFAULT_PROXY_FLUSH_INTERVAL_MS),
            store_path: None,
        }
    }
}

/// Cache tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    #[serde(rename = "default_ttl_ms", with = "duration_millis")]
    pub default_ttl: Duration,
    /// Capacity applied to domains without an explicit limit.
    pub max_items_per_domain: usize,
    /// Per-domain capacity overrides.
    pub domain_limits: HashMap<String, usize>,
    #[serde(rename = "sweep_interval_ms", with = "duration_millis")]
    pub sweep_interval: Duration,
    #[serde(rename = "purge_interval_ms", with = "duration_millis")]
    pub purge_interval: Duration,
    /// JSON file mirroring the cache across restarts; `None` disables it.
    pub persist_path: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_millis(DEFAULT_CACHE_TTL_MS),
            max_items_per_domain: DEFAULT_CACHE_MAX_ITEMS,
            domain_limits: HashMap::new(),
            sweep_interval: Duration::from_millis(DEFAULT_CACHE_SWEEP_INTERVAL_MS),
            purge_interval: Duration::from_millis(DEFAULT_CACHE_PURGE_INTERVAL_MS),
            persist_path: None,
        }
    }
}

impl CacheSettings {
    /// Capacity for `domain`.
    pub fn max_items_for(&self, domain: &str) -> usize {
        self.domain_limits.get(domain).copied().unwrap_or(self.max_items_per_domain)
    }
}
