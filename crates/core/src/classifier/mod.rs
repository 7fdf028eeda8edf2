//! Error classification
//!
//! [`ErrorClassifier::classify`] turns a raw [`ScrapeError`] into a
//! [`ClassifiedError`] carrying one [`ErrorKind`] and its [`RetryPolicy`].
//! The first rule that matches wins:
//!
//! 1. a kind already tagged on the error
//! 2. a known HTTP status code
//! 3. a low-level network fault code or timeout flag
//! 4. site-specific patterns for the request host
//! 5. generic captcha / bot / auth / rate-limit vocabulary
//! 6. an implausibly short body, then blocking vocabulary
//! 7. `UNKNOWN`
//!
//! Results are memoized in a bounded map. Classification never fails.

pub mod context;
pub mod error;
pub mod memo;
pub mod patterns;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use scrapeshield_common::observability::names;
use scrapeshield_common::{Clock, MetricsCollector, NoOpMetricsCollector, SystemClock};
use scrapeshield_domain::{ClassifierSettings, ErrorKind, RetryPolicies, RetryPolicy};
use tracing::debug;

pub use self::context::ErrorContext;
pub use self::error::{ClassifiedError, ScrapeError};
use self::memo::{ClassificationMemo, MemoKey};
pub use self::patterns::{ErrorPattern, PatternRegistry};
use crate::net::truncate_on_char_boundary;

/// Longest slice of a body the pattern steps look at.
const MAX_SCAN_BYTES: usize = 64 * 1024;

const UNKNOWN_DOMAIN: &str = "unknown";

/// Fault codes and the kinds they map to. Matched against the error code
/// first, then as substrings of the message.
const NETWORK_CODES: &[(&str, ErrorKind)] = &[
    ("ERR_PROXY_CONNECTION_FAILED", ErrorKind::ProxyError),
    ("ERR_TUNNEL_CONNECTION_FAILED", ErrorKind::ProxyError),
    ("ERR_PROXY_AUTH", ErrorKind::ProxyError),
    ("ERR_NO_SUPPORTED_PROXIES", ErrorKind::ProxyError),
    ("ECONNRESET", ErrorKind::ConnectionReset),
    ("ERR_CONNECTION_RESET", ErrorKind::ConnectionReset),
    ("ENOTFOUND", ErrorKind::DnsLookup),
    ("EAI_AGAIN", ErrorKind::DnsLookup),
    ("ERR_NAME_NOT_RESOLVED", ErrorKind::DnsLookup),
    ("ESOCKETTIMEDOUT", ErrorKind::Timeout),
    ("ETIMEDOUT", ErrorKind::Timeout),
    ("ERR_CONNECTION_TIMED_OUT", ErrorKind::Timeout),
    ("ERR_TIMED_OUT", ErrorKind::Timeout),
    ("ECONNREFUSED", ErrorKind::Network),
    ("EHOSTUNREACH", ErrorKind::Network),
    ("ENETUNREACH", ErrorKind::Network),
    ("EPIPE", ErrorKind::Network),
    ("ERR_CONNECTION_REFUSED", ErrorKind::Network),
    ("ERR_CONNECTION_CLOSED", ErrorKind::Network),
    ("ERR_INTERNET_DISCONNECTED", ErrorKind::Network),
    ("ERR_NETWORK_CHANGED", ErrorKind::Network),
];

/// Snapshot of classification counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifierStats {
    pub total: u64,
    pub by_kind: BTreeMap<ErrorKind, u64>,
    /// Keyed by `(domain, kind)`; failures without a URL count under
    /// `unknown`.
    pub by_domain_kind: BTreeMap<(String, ErrorKind), u64>,
}

/// Maps raw failures onto the closed [`ErrorKind`] taxonomy.
pub struct ErrorClassifier<C: Clock = SystemClock> {
    policies: RetryPolicies,
    patterns: PatternRegistry,
    memo: Mutex<ClassificationMemo>,
    min_content_length: usize,
    total: AtomicU64,
    by_domain_kind: DashMap<(String, ErrorKind), u64>,
    metrics: Arc<dyn MetricsCollector>,
    clock: C,
}

impl ErrorClassifier<SystemClock> {
    pub fn new(settings: &ClassifierSettings, policies: RetryPolicies) -> Self {
        Self::with_clock(settings, policies, SystemClock)
    }
}

impl<C: Clock> ErrorClassifier<C> {
    pub fn with_clock(settings: &ClassifierSettings, policies: RetryPolicies, clock: C) -> Self {
        Self {
            policies,
            patterns: PatternRegistry::with_defaults(),
            memo: Mutex::new(ClassificationMemo::new(settings.memo_capacity)),
            min_content_length: settings.min_content_length,
            total: AtomicU64::new(0),
            by_domain_kind: DashMap::new(),
            metrics: Arc::new(NoOpMetricsCollector),
            clock,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Policy table in use.
    pub fn policies(&self) -> &RetryPolicies {
        &self.policies
    }

    pub fn policy(&self, kind: ErrorKind) -> RetryPolicy {
        self.policies.get(kind)
    }

    /// Classifies `error`, merging `context` over the error's own context.
    pub fn classify(&self, error: &ScrapeError, context: &ErrorContext) -> ClassifiedError {
        let context = merge_context(&error.context, context);
        let key = MemoKey::for_error(error, context.url.as_deref(), context.status_code);

        let memoized = self.memo.lock().get(&key);
        let kind = match memoized {
            Some(kind) => kind,
            None => {
                let kind = self.resolve_kind(error, &context);
                self.memo.lock().insert(key, kind);
                kind
            }
        };

        let domain = context.domain().unwrap_or_else(|| UNKNOWN_DOMAIN.to_string());
        self.record(&domain, kind);
        debug!(
            kind = %kind,
            domain = %domain,
            status = ?context.status_code,
            cached = memoized.is_some(),
            "Classified scrape error"
        );

        ClassifiedError {
            kind,
            original: error.clone(),
            policy: self.policies.get(kind),
            context,
            classified_at: self.clock.utc_now(),
            attempts: 0,
        }
    }

    /// Registers a site-specific pattern at runtime.
    ///
    /// Clears the memo so earlier results cannot shadow the new pattern.
    pub fn add_error_pattern(
        &self,
        site: &str,
        pattern: &str,
        kind: ErrorKind,
    ) -> Result<(), regex::Error> {
        self.patterns.add(site, pattern, kind)?;
        self.memo.lock().clear();
        debug!(site = site, kind = %kind, "Registered error pattern");
        Ok(())
    }

    pub fn stats(&self) -> ClassifierStats {
        let mut stats =
            ClassifierStats { total: self.total.load(Ordering::Relaxed), ..Default::default() };
        for entry in &self.by_domain_kind {
            let (domain, kind) = entry.key();
            *stats.by_kind.entry(*kind).or_insert(0) += *entry.value();
            stats.by_domain_kind.insert((domain.clone(), *kind), *entry.value());
        }
        stats
    }

    /// Memoized classifications currently held.
    pub fn memo_len(&self) -> usize {
        self.memo.lock().len()
    }

    fn record(&self, domain: &str, kind: ErrorKind) {
        self.total.fetch_add(1, Ordering::Relaxed);
        *self.by_domain_kind.entry((domain.to_string(), kind)).or_insert(0) += 1;
        self.metrics
            .increment_counter(names::ERRORS_TOTAL, &[("kind", kind.as_str()), ("domain", domain)]);
    }

    fn resolve_kind(&self, error: &ScrapeError, context: &ErrorContext) -> ErrorKind {
        if let Some(kind) = error.kind {
            return kind;
        }
        if let Some(kind) = context.status_code.and_then(ErrorKind::from_status) {
            return kind;
        }
        if let Some(kind) = network_kind(error) {
            return kind;
        }

        let body = context.response_body.as_deref().map(|b| truncate_on_char_boundary(b, MAX_SCAN_BYTES));
        let haystacks: Vec<&str> = std::iter::once(error.message.as_str()).chain(body).collect();

        if let Some(host) = context.domain() {
            if let Some(kind) = self.patterns.match_site(&host, &haystacks) {
                return kind;
            }
        }
        if let Some(kind) = self.patterns.match_generic(&haystacks) {
            return kind;
        }
        if body.is_some_and(|b| b.trim().len() < self.min_content_length) {
            return ErrorKind::ContentEmpty;
        }
        if PatternRegistry::has_blocking_vocabulary(&haystacks) {
            return ErrorKind::BotDetection;
        }
        ErrorKind::Unknown
    }
}

fn network_kind(error: &ScrapeError) -> Option<ErrorKind> {
    if let Some(code) = error.code.as_deref() {
        let code = code.trim().to_ascii_uppercase();
        let code = code.strip_prefix("NET::").unwrap_or(&code);
        if let Some((_, kind)) = NETWORK_CODES.iter().find(|(known, _)| *known == code) {
            return Some(*kind);
        }
    }
    let message = error.message.to_ascii_uppercase();
    if let Some((_, kind)) = NETWORK_CODES.iter().find(|(known, _)| message.contains(known)) {
        return Some(*kind);
    }
    error.timed_out.then_some(ErrorKind::Timeout)
}

/// Fields set in `overlay` win; headers are unioned.
fn merge_context(base: &ErrorContext, overlay: &ErrorContext) -> ErrorContext {
    let mut merged = base.clone();
    if overlay.status_code.is_some() {
        merged.status_code = overlay.status_code;
    }
    if overlay.url.is_some() {
        merged.url.clone_from(&overlay.url);
    }
    if overlay.response_body.is_some() {
        merged.response_body.clone_from(&overlay.response_body);
    }
    for (name, value) in &overlay.headers {
        merged.headers.insert(name.clone(), value.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use scrapeshield_common::InMemoryMetricsCollector;

    use super::*;

    fn classifier() -> ErrorClassifier {
        ErrorClassifier::new(&ClassifierSettings::default(), RetryPolicies::default())
    }

    fn long_body(text: &str) -> String {
        format!("<html><body>{text} {}</body></html>", "lorem ipsum ".repeat(20))
    }

    #[test]
    fn tagged_kind_wins_over_status() {
        let err = ScrapeError::http(404, "").with_kind(ErrorKind::ProxyBanned);
        assert_eq!(classifier().classify(&err, &ErrorContext::new()).kind, ErrorKind::ProxyBanned);
    }

    #[test]
    fn status_codes_map_to_dedicated_kinds() {
        let c = classifier();
        for (status, kind) in [
            (400, ErrorKind::Http400),
            (401, ErrorKind::Http401),
            (403, ErrorKind::Http403),
            (404, ErrorKind::Http404),
            (429, ErrorKind::Http429),
            (500, ErrorKind::Http500),
            (502, ErrorKind::Http500),
            (503, ErrorKind::Http503),
        ] {
            let classified = c.classify(&ScrapeError::http(status, long_body("")), &ErrorContext::new());
            assert_eq!(classified.kind, kind, "status {status}");
            assert_eq!(classified.policy, RetryPolicy::builtin(kind));
        }
    }

    #[test]
    fn network_codes() {
        let c = classifier();
        let ctx = ErrorContext::new();
        assert_eq!(c.classify(&ScrapeError::network("ECONNRESET", "socket hang up"), &ctx).kind, ErrorKind::ConnectionReset);
        assert_eq!(c.classify(&ScrapeError::network("EAI_AGAIN", "getaddrinfo"), &ctx).kind, ErrorKind::DnsLookup);
        assert_eq!(c.classify(&ScrapeError::network("ECONNREFUSED", "refused"), &ctx).kind, ErrorKind::Network);
        assert_eq!(
            c.classify(&ScrapeError::new("net::ERR_TUNNEL_CONNECTION_FAILED at https://x.com"), &ctx).kind,
            ErrorKind::ProxyError
        );
        assert_eq!(c.classify(&ScrapeError::timeout("attempt exceeded 30s"), &ctx).kind, ErrorKind::Timeout);
    }

    #[test]
    fn site_patterns_apply_before_generic() {
        let c = classifier();
        let err = ScrapeError::new("navigation finished")
            .with_context(ErrorContext::new().with_status(200).with_body(long_body("Robot or human?")));
        let ctx = ErrorContext::new().with_url("https://www.walmart.com/ip/123");
        assert_eq!(c.classify(&err, &ctx).kind, ErrorKind::BotDetection);
    }

    #[test]
    fn generic_captcha_vocabulary() {
        let c = classifier();
        let err = ScrapeError::new("page loaded")
            .with_context(ErrorContext::new().with_body(long_body("please complete the reCAPTCHA")));
        assert_eq!(c.classify(&err, &ErrorContext::new().with_url("https://shop.example/p/1")).kind, ErrorKind::Captcha);
    }

    #[test]
    fn short_body_is_content_empty() {
        let c = classifier();
        let err = ScrapeError::new("no product data")
            .with_context(ErrorContext::new().with_status(200).with_body("<html></html>"));
        assert_eq!(c.classify(&err, &ErrorContext::new()).kind, ErrorKind::ContentEmpty);
    }

    #[test]
    fn blocking_vocabulary_falls_back_to_bot_detection() {
        let c = classifier();
        let err = ScrapeError::new("extraction failed")
            .with_context(ErrorContext::new().with_body(long_body("Your request was blocked.")));
        assert_eq!(c.classify(&err, &ErrorContext::new()).kind, ErrorKind::BotDetection);
    }

    #[test]
    fn unmatched_error_is_unknown_with_fallback_policy() {
        let c = classifier();
        let classified = c.classify(&ScrapeError::new("something odd"), &ErrorContext::new());
        assert_eq!(classified.kind, ErrorKind::Unknown);
        assert_eq!(classified.policy, RetryPolicy::builtin(ErrorKind::Unknown));
    }

    #[test]
    fn memoization_is_transparent() {
        let c = classifier();
        let err = ScrapeError::new("Too Many Requests");
        let ctx = ErrorContext::new().with_url("https://site.com/a");
        let first = c.classify(&err, &ctx);
        let second = c.classify(&err, &ctx);
        assert_eq!(first.kind, second.kind);
        assert_eq!(first.kind, ErrorKind::Http429);
        assert_eq!(c.memo_len(), 1);
    }

    #[test]
    fn runtime_pattern_invalidates_memo() {
        let c = classifier();
        let err = ScrapeError::new("SHOP-ERR-77");
        let ctx = ErrorContext::new().with_url("https://shop.example.com/item");
        assert_eq!(c.classify(&err, &ctx).kind, ErrorKind::Unknown);

        c.add_error_pattern("shop.example", r"SHOP-ERR-\d+", ErrorKind::ResourceLimit).unwrap();
        assert_eq!(c.classify(&err, &ctx).kind, ErrorKind::ResourceLimit);
        assert!(c.add_error_pattern("shop.example", "(", ErrorKind::Captcha).is_err());
    }

    #[test]
    fn counters_track_domain_and_kind() {
        let metrics = Arc::new(InMemoryMetricsCollector::new());
        let c = classifier().with_metrics(metrics.clone());
        let ctx = ErrorContext::new().with_url("https://www.site.com/p");
        c.classify(&ScrapeError::http(429, ""), &ctx);
        c.classify(&ScrapeError::http(429, ""), &ctx);
        c.classify(&ScrapeError::new("odd"), &ErrorContext::new());

        let stats = c.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_kind[&ErrorKind::Http429], 2);
        assert_eq!(stats.by_domain_kind[&("site.com".to_string(), ErrorKind::Http429)], 2);
        assert_eq!(stats.by_domain_kind[&("unknown".to_string(), ErrorKind::Unknown)], 1);
        assert_eq!(
            metrics.counter(names::ERRORS_TOTAL, &[("kind", "HTTP_429"), ("domain", "site.com")]),
            2
        );
    }

    #[test]
    fn malformed_input_degrades_to_unknown() {
        let c = classifier();
        let err = ScrapeError::new("\u{0}\u{fffd}").with_code("").with_context(ErrorContext {
            url: Some("::not a url::".into()),
            ..ErrorContext::default()
        });
        assert_eq!(c.classify(&err, &ErrorContext::new()).kind, ErrorKind::Unknown);
    }
}
