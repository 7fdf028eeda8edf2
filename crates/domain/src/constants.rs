//! Domain constants
//!
//! Centralized defaults shared by configuration and the core services.

// Classifier
pub const DEFAULT_CLASSIFIER_MEMO_CAPACITY: usize = 1000;
pub const MEMO_EVICTION_FRACTION: f64 = 0.2;
pub const MIN_CONTENT_LENGTH: usize = 100;

// Circuit breaker
pub const DEFAULT_BREAKER_THRESHOLD: u32 = 5;
pub const DEFAULT_BREAKER_RESET_MS: u64 = 60_000;

// Retry orchestration
pub const DEFAULT_MAX_DELAY_MS: u64 = 60_000;
pub const DEFAULT_JITTER_FACTOR: f64 = 0.1;
pub const DEFAULT_ATTEMPT_TIMEOUT_MS: u64 = 30_000;
pub const TIMEOUT_GROWTH_FACTOR: f64 = 1.5;

// Proxy pool
pub const DEFAULT_PROXY_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_MIN_BAN_MS: u64 = 30 * 60 * 1000;
pub const DEFAULT_HEALTH_CHECK_INTERVAL_MS: u64 = 5 * 60 * 1000;
pub const DEFAULT_HEALTH_CHECK_URL: &str = "https://httpbin.org/ip";
pub const DEFAULT_HEALTH_CHECK_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_HEALTH_CHECK_CONCURRENCY: usize = 8;
pub const DEFAULT_DISABLED_SAMPLE_SIZE: usize = 5;
pub const DEFAULT_MIN_ACTIVE_PROXIES: usize = 3;
pub const DEFAULT_PROXY_FLUSH_INTERVAL_MS: u64 = 60_000;

// Scoring weights
pub const SCORE_WEIGHT_SUCCESS: f64 = 0.5;
pub const SCORE_WEIGHT_SPEED: f64 = 0.2;
pub const SCORE_WEIGHT_RECENCY: f64 = 0.1;
pub const SCORE_WEIGHT_BANS: f64 = 0.2;
pub const SCORE_REFERENCE_RESPONSE_MS: f64 = 5000.0;
pub const SCORE_BAN_PENALTY: f64 = 0.1;
pub const SCORE_BAN_FLOOR: f64 = 0.1;
pub const SCORE_RECENCY_WINDOW_HOURS: f64 = 24.0;

// Cache
pub const DEFAULT_CACHE_TTL_MS: u64 = 60 * 60 * 1000;
pub const DEFAULT_CACHE_MAX_ITEMS: usize = 1000;
pub const DEFAULT_CACHE_SWEEP_INTERVAL_MS: u64 = 5 * 60 * 1000;
pub const DEFAULT_CACHE_PURGE_INTERVAL_MS: u64 = 60_000;
pub const MAX_IDENTIFIER_LENGTH: usize = 100;
pub const HASHED_IDENTIFIER_PREFIX: &str = "h_";
pub const HASHED_IDENTIFIER_HEX_LEN: usize = 32;
pub const DEFAULT_CACHE_DOMAIN: &str = "default";
