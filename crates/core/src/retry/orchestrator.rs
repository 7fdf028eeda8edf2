//! The retry control loop
//!
//! One call to [`RetryOrchestrator::with_retry`] drives a single logical
//! fetch: gate on the circuit breaker, run an attempt, classify the failure,
//! feed the breaker and the proxy pool, then decide whether and how to try
//! again. Sleeping is the only suspension point besides the operation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use scrapeshield_common::observability::names;
use scrapeshield_common::{Backoff, Clock, MetricsCollector, NoOpMetricsCollector, SystemClock};
use scrapeshield_domain::constants::TIMEOUT_GROWTH_FACTOR;
use scrapeshield_domain::{ErrorKind, PoolSet, RetryPolicy, RetrySettings};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::ports::{CaptchaError, CaptchaSolver};
use super::state::{RetryContext, RetryOutcome, RetryState};
use crate::breaker::DomainCircuitBreaker;
use crate::classifier::{ClassifiedError, ErrorClassifier, ErrorContext, ScrapeError};
use crate::proxy::ProxyManager;

/// Drives operations through classification, backoff and proxy rotation.
pub struct RetryOrchestrator<C: Clock = SystemClock> {
    classifier: Arc<ErrorClassifier<C>>,
    breaker: Arc<DomainCircuitBreaker<C>>,
    proxies: Option<Arc<ProxyManager<C>>>,
    captcha: Option<Arc<dyn CaptchaSolver>>,
    backoff: Backoff,
    attempt_timeout: Duration,
    max_duration: Option<Duration>,
    metrics: Arc<dyn MetricsCollector>,
}

impl<C: Clock> RetryOrchestrator<C> {
    pub fn new(
        settings: &RetrySettings,
        classifier: Arc<ErrorClassifier<C>>,
        breaker: Arc<DomainCircuitBreaker<C>>,
    ) -> Self {
        let backoff = Backoff::new(settings.max_delay, settings.jitter_factor).unwrap_or_else(|err| {
            warn!(error = %err, "Invalid retry jitter; backing off without jitter");
            Backoff::deterministic(settings.max_delay)
        });
        Self {
            classifier,
            breaker,
            proxies: None,
            captcha: None,
            backoff,
            attempt_timeout: settings.attempt_timeout,
            max_duration: settings.max_duration,
            metrics: Arc::new(NoOpMetricsCollector),
        }
    }

    pub fn with_proxies(mut self, proxies: Arc<ProxyManager<C>>) -> Self {
        self.proxies = Some(proxies);
        self
    }

    pub fn with_captcha_solver(mut self, solver: Arc<dyn CaptchaSolver>) -> Self {
        self.captcha = Some(solver);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn classifier(&self) -> &Arc<ErrorClassifier<C>> {
        &self.classifier
    }

    pub fn breaker(&self) -> &Arc<DomainCircuitBreaker<C>> {
        &self.breaker
    }

    /// Runs `operation` until it succeeds or its failure is terminal.
    ///
    /// A failure is terminal when the retry budget
    /// (`min(policy.max_retries, context.max_retries)`) is spent, when the
    /// deadline has passed or the next sleep would overrun it, or when the
    /// breaker closes the domain. The returned error carries the number of
    /// operation attempts made; a breaker rejection up front makes none.
    #[instrument(skip(self, context, operation), fields(domain = %context.domain))]
    pub async fn with_retry<T, F, Fut>(
        &self,
        context: &RetryContext,
        mut operation: F,
    ) -> Result<RetryOutcome<T>, ClassifiedError>
    where
        F: FnMut(RetryState) -> Fut,
        Fut: Future<Output = Result<T, ScrapeError>>,
    {
        let started = Instant::now();
        let deadline = context.max_duration.or(self.max_duration).map(|limit| started + limit);

        if !self.breaker.is_request_allowed(&context.domain) {
            self.record_outcome("circuit_open");
            return Err(self.circuit_open(context, 0));
        }

        let mut state = RetryState::initial(self.initial_proxy(context), self.attempt_timeout);
        let mut delays = Vec::new();

        loop {
            let attempt_started = Instant::now();
            let attempt_timeout = match deadline {
                Some(deadline) => {
                    state.attempt_timeout.min(deadline.saturating_duration_since(attempt_started))
                }
                None => state.attempt_timeout,
            };
            let proxy_id = state.proxy_id().map(str::to_string);

            let result =
                match tokio::time::timeout(attempt_timeout, operation(state.clone())).await {
                    Ok(result) => result,
                    Err(_) => Err(ScrapeError::timeout(format!(
                        "attempt timed out after {}ms",
                        attempt_timeout.as_millis()
                    ))),
                };

            let error = match result {
                Ok(value) => {
                    self.breaker.record_success(&context.domain);
                    if let (Some(proxies), Some(id)) = (&self.proxies, proxy_id.as_deref()) {
                        proxies.record_success(id, attempt_started.elapsed());
                    }
                    self.record_outcome("success");
                    if state.retry_count > 0 {
                        info!(retries = state.retry_count, "Operation succeeded after retries");
                    }
                    return Ok(RetryOutcome {
                        value,
                        retry_count: state.retry_count,
                        delays,
                        proxy_id,
                        elapsed: started.elapsed(),
                    });
                }
                Err(error) => error,
            };

            let classified =
                self.classifier.classify(&error, &ErrorContext::new().with_url(context.url.clone()));
            let kind = classified.kind;
            let policy = classified.policy;

            self.breaker.record_failure(&context.domain);
            if let (Some(proxies), Some(id)) = (&self.proxies, proxy_id.as_deref()) {
                proxies.record_failure(id, Some(kind));
            }
            state.retry_count += 1;
            state.last_error = Some(kind);
            self.metrics.increment_counter(names::RETRY_ATTEMPTS_TOTAL, &[("kind", kind.as_str())]);

            let attempts = state.retry_count;
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                warn!(kind = %kind, attempts = attempts, "Retry deadline exceeded");
                self.record_outcome("deadline");
                return Err(classified.with_attempts(attempts));
            }
            let budget = policy.max_retries.min(context.max_retries.unwrap_or(u32::MAX));
            if attempts > budget {
                debug!(kind = %kind, attempts = attempts, budget = budget, "Retry budget exhausted");
                self.record_outcome(if budget == 0 { "not_retryable" } else { "exhausted" });
                return Err(classified.with_attempts(attempts));
            }

            let delay = self.next_delay(&classified, &policy, attempts);
            if kind == ErrorKind::Timeout {
                state.attempt_timeout = grow_timeout(state.attempt_timeout);
            }
            self.apply_side_effects(context, &classified, &policy, deadline, &mut state).await;

            if deadline.is_some_and(|deadline| deadline.saturating_duration_since(Instant::now()) <= delay) {
                warn!(
                    kind = %kind,
                    delay_ms = delay.as_millis() as u64,
                    "Next retry would overrun the deadline"
                );
                self.record_outcome("deadline");
                return Err(classified.with_attempts(attempts));
            }

            debug!(
                kind = %kind,
                retry = attempts,
                delay_ms = delay.as_millis() as u64,
                proxy = ?state.proxy_id(),
                "Retrying after backoff"
            );
            self.metrics.record_timing(
                names::RETRY_DELAY_MS,
                u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                &[("kind", kind.as_str())],
            );
            tokio::time::sleep(delay).await;
            state.delay = delay;
            delays.push(delay);

            if !self.breaker.is_request_allowed(&context.domain) {
                self.record_outcome("circuit_open");
                return Err(self.circuit_open(context, attempts));
            }
        }
    }

    fn initial_proxy(&self, context: &RetryContext) -> Option<scrapeshield_domain::Proxy> {
        if context.proxy.is_some() {
            return context.proxy.clone();
        }
        let proxies = self.proxies.as_ref()?;
        proxies.get_proxy(&context.url, &context.proxy_request)
    }

    /// Policy backoff, jittered and capped; `Retry-After` wins when longer
    /// but is held to the same cap.
    fn next_delay(&self, error: &ClassifiedError, policy: &RetryPolicy, retry: u32) -> Duration {
        let delay = self.backoff.apply(policy.delay_for(retry));
        if error.kind != ErrorKind::Http429 {
            return delay;
        }
        let Some(secs) = error.context.retry_after_secs() else {
            return delay;
        };
        let requested = Duration::from_secs(secs);
        let max_delay = self.backoff.max_delay();
        if requested > max_delay {
            warn!(
                retry_after_secs = secs,
                max_delay_ms = max_delay.as_millis() as u64,
                "Clamping Retry-After to the maximum delay"
            );
        }
        delay.max(requested).min(max_delay)
    }

    async fn apply_side_effects(
        &self,
        context: &RetryContext,
        error: &ClassifiedError,
        policy: &RetryPolicy,
        deadline: Option<Instant>,
        state: &mut RetryState,
    ) {
        if let Some(proxies) = &self.proxies {
            let current = state.proxy_id().map(str::to_string);
            if let (true, Some(id)) = (policy.disable_proxy, current.as_deref()) {
                if proxies.proxy_set(id) == Some(PoolSet::Active) {
                    proxies.mark_proxy_banned(id);
                }
            }
            if policy.rotate_proxy {
                let mut request = context.proxy_request.clone();
                request.exclude = current.clone();
                match proxies.get_proxy(&context.url, &request) {
                    Some(next) => state.proxy = Some(next),
                    None => {
                        let still_active = current
                            .as_deref()
                            .is_some_and(|id| proxies.proxy_set(id) == Some(PoolSet::Active));
                        if !still_active {
                            state.proxy = None;
                        }
                    }
                }
            }
        }

        state.recreate_session = policy.recreate_session;
        state.requires_auth = policy.requires_auth;
        state.enhance_stealth |= policy.enhance_stealth;
        state.reduce_resource_usage |= policy.reduce_resource_usage;

        state.captcha_solution = None;
        if !policy.solve_captcha {
            return;
        }
        let (Some(solver), Some(params)) = (&self.captcha, &context.captcha) else {
            return;
        };
        let solved = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                tokio::time::timeout(remaining, solver.solve(error.kind, params))
                    .await
                    .unwrap_or(Err(CaptchaError::Timeout))
            }
            None => solver.solve(error.kind, params).await,
        };
        match solved {
            Ok(Some(token)) => {
                debug!(kind = %error.kind, "Captcha solved");
                state.captcha_solution = Some(token);
            }
            Ok(None) => debug!(kind = %error.kind, "Captcha solver declined"),
            Err(err) => warn!(error = %err, "Captcha solving failed; retrying without a token"),
        }
    }

    fn circuit_open(&self, context: &RetryContext, attempts: u32) -> ClassifiedError {
        let error = ScrapeError::tagged(
            ErrorKind::CircuitOpen,
            format!("circuit open for {}", context.domain),
        );
        self.classifier
            .classify(&error, &ErrorContext::new().with_url(context.url.clone()))
            .with_attempts(attempts)
    }

    fn record_outcome(&self, outcome: &str) {
        self.metrics.increment_counter(names::RETRY_OUTCOMES_TOTAL, &[("outcome", outcome)]);
    }
}

fn grow_timeout(timeout: Duration) -> Duration {
    Duration::try_from_secs_f64(timeout.as_secs_f64() * TIMEOUT_GROWTH_FACTOR)
        .unwrap_or(Duration::MAX)
}
