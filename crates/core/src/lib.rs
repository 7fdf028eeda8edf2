//! # ScrapeShield Core
//!
//! Resilience layer for scraping adversarial sites. No I/O of its own.
//!
//! This crate contains:
//! - Error classification into a closed taxonomy with per-kind retry policies
//! - The retry orchestrator driving single-attempt operations
//! - A per-domain circuit breaker
//! - A scored proxy pool with affinity, bans and health checks
//! - A TTL- and capacity-bounded result cache
//!
//! ## Architecture Principles
//! - Depends only on `scrapeshield-common` and `scrapeshield-domain`
//! - Persistence, probing and captcha solving arrive through port traits
//! - Every service takes an injectable clock

#![forbid(unsafe_code)]

pub mod breaker;
pub mod cache;
pub mod classifier;
pub mod net;
pub mod proxy;
pub mod retry;
pub mod service;

pub use breaker::DomainCircuitBreaker;
pub use cache::{CacheBackend, CacheKeyBuilder, CacheStats, ScrapeCache};
pub use classifier::{
    ClassifiedError, ClassifierStats, ErrorClassifier, ErrorContext, PatternRegistry, ScrapeError,
};
pub use proxy::{
    HealthReport, ProbeResult, ProxyManager, ProxyProbe, ProxyRequest, ProxyStore,
};
pub use retry::{
    CaptchaError, CaptchaParams, CaptchaSolver, RetryContext, RetryOrchestrator, RetryOutcome,
    RetryState,
};
pub use service::{Fetched, ResilienceServices, ResilienceServicesBuilder};
