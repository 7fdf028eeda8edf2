//! Per-call retry context, state and outcome

use std::time::Duration;

use scrapeshield_domain::constants::DEFAULT_CACHE_DOMAIN;
use scrapeshield_domain::{ErrorKind, Proxy};

use super::ports::CaptchaParams;
use crate::net::domain_or;
use crate::proxy::ProxyRequest;

/// What a caller tells the orchestrator about one logical fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryContext {
    pub url: String,
    /// Breaker key; derived from `url` unless set explicitly.
    pub domain: String,
    /// Proxy for the first attempt.
    pub proxy: Option<Proxy>,
    /// Filters used when picking or rotating proxies from the pool.
    pub proxy_request: ProxyRequest,
    /// Caps the policy's retry budget.
    pub max_retries: Option<u32>,
    /// Overall deadline measured from the first attempt.
    pub max_duration: Option<Duration>,
    pub captcha: Option<CaptchaParams>,
}

impl RetryContext {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let domain = domain_or(&url, DEFAULT_CACHE_DOMAIN);
        Self {
            url,
            domain,
            proxy: None,
            proxy_request: ProxyRequest::default(),
            max_retries: None,
            max_duration: None,
            captcha: None,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_proxy(mut self, proxy: Proxy) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_proxy_request(mut self, request: ProxyRequest) -> Self {
        self.proxy_request = request;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = Some(max_duration);
        self
    }

    pub fn with_captcha(mut self, params: CaptchaParams) -> Self {
        self.captcha = Some(params);
        self
    }
}

/// What the next attempt should do, handed to the operation each time.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryState {
    /// Failed attempts so far; 0 on the first attempt.
    pub retry_count: u32,
    /// Delay slept before this attempt.
    pub delay: Duration,
    pub proxy: Option<Proxy>,
    pub captcha_solution: Option<String>,
    /// Start a fresh browser session for this attempt.
    pub recreate_session: bool,
    /// Escalated once; stays on for the rest of the call.
    pub enhance_stealth: bool,
    /// Escalated once; stays on for the rest of the call.
    pub reduce_resource_usage: bool,
    pub requires_auth: bool,
    pub attempt_timeout: Duration,
    pub last_error: Option<ErrorKind>,
}

impl RetryState {
    pub(crate) fn initial(proxy: Option<Proxy>, attempt_timeout: Duration) -> Self {
        Self {
            retry_count: 0,
            delay: Duration::ZERO,
            proxy,
            captcha_solution: None,
            recreate_session: false,
            enhance_stealth: false,
            reduce_resource_usage: false,
            requires_auth: false,
            attempt_timeout,
            last_error: None,
        }
    }

    pub fn proxy_id(&self) -> Option<&str> {
        self.proxy.as_ref().map(|proxy| proxy.id.as_str())
    }
}

/// Successful result of an orchestrated call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    pub value: T,
    /// Failed attempts before the success.
    pub retry_count: u32,
    /// Delays slept, in order.
    pub delays: Vec<Duration>,
    /// Proxy used by the successful attempt.
    pub proxy_id: Option<String>,
    pub elapsed: Duration,
}
