//! Wiring of the resilience services and their background tasks

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use scrapeshield_common::{
    Clock, MetricsCollector, NoOpMetricsCollector, PeriodicJob, PeriodicTask, PeriodicTaskConfig,
    SystemClock,
};
use scrapeshield_domain::{Config, Result, RetryPolicies, ScrapeShieldError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::breaker::DomainCircuitBreaker;
use crate::cache::{CacheBackend, CachePurgeJob, CacheSweepJob, ScrapeCache};
use crate::classifier::{ClassifiedError, ErrorClassifier, ScrapeError};
use crate::proxy::{HealthCheckJob, ProxyFlushJob, ProxyManager, ProxyProbe, ProxyStore};
use crate::retry::{CaptchaSolver, RetryContext, RetryOrchestrator, RetryState};

/// Value returned by [`ResilienceServices::fetch`].
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub value: T,
    /// Served from the cache without running the operation.
    pub cached: bool,
    /// Failed attempts before the value was produced.
    pub retry_count: u32,
}

/// Builder for [`ResilienceServices`].
pub struct ResilienceServicesBuilder<C: Clock = SystemClock> {
    config: Config,
    clock: C,
    metrics: Arc<dyn MetricsCollector>,
    proxy_store: Option<Arc<dyn ProxyStore>>,
    proxy_probe: Option<Arc<dyn ProxyProbe>>,
    cache_backend: Option<Arc<dyn CacheBackend>>,
    captcha: Option<Arc<dyn CaptchaSolver>>,
}

impl<C: Clock + Clone> ResilienceServicesBuilder<C> {
    pub fn clock<C2: Clock + Clone>(self, clock: C2) -> ResilienceServicesBuilder<C2> {
        ResilienceServicesBuilder {
            config: self.config,
            clock,
            metrics: self.metrics,
            proxy_store: self.proxy_store,
            proxy_probe: self.proxy_probe,
            cache_backend: self.cache_backend,
            captcha: self.captcha,
        }
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn proxy_store(mut self, store: Arc<dyn ProxyStore>) -> Self {
        self.proxy_store = Some(store);
        self
    }

    pub fn proxy_probe(mut self, probe: Arc<dyn ProxyProbe>) -> Self {
        self.proxy_probe = Some(probe);
        self
    }

    pub fn cache_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.cache_backend = Some(backend);
        self
    }

    pub fn captcha_solver(mut self, solver: Arc<dyn CaptchaSolver>) -> Self {
        self.captcha = Some(solver);
        self
    }

    /// Validates the configuration and constructs every service.
    pub fn build(self) -> Result<ResilienceServices<C>> {
        self.config.validate()?;
        let config = self.config;
        let metrics = self.metrics;

        let policies = RetryPolicies::with_overrides(&config.retry.policy_overrides);
        let classifier = Arc::new(
            ErrorClassifier::with_clock(&config.classifier, policies, self.clock.clone())
                .with_metrics(Arc::clone(&metrics)),
        );
        let breaker = Arc::new(
            DomainCircuitBreaker::with_clock(&config.circuit_breaker, self.clock.clone())
                .with_metrics(Arc::clone(&metrics)),
        );

        let mut proxies = ProxyManager::with_clock(config.proxy_pool.clone(), self.clock.clone())
            .with_metrics(Arc::clone(&metrics));
        if let Some(store) = self.proxy_store {
            proxies = proxies.with_store(store);
        }
        let proxies = Arc::new(proxies);

        let mut cache = ScrapeCache::with_clock(config.cache.clone(), self.clock)
            .with_metrics(Arc::clone(&metrics));
        if let Some(backend) = self.cache_backend {
            cache = cache.with_backend(backend);
        }
        let cache = Arc::new(cache);

        let mut orchestrator =
            RetryOrchestrator::new(&config.retry, Arc::clone(&classifier), Arc::clone(&breaker))
                .with_proxies(Arc::clone(&proxies))
                .with_metrics(metrics);
        if let Some(solver) = self.captcha {
            orchestrator = orchestrator.with_captcha_solver(solver);
        }

        Ok(ResilienceServices {
            config,
            classifier,
            breaker,
            proxies,
            cache,
            orchestrator: Arc::new(orchestrator),
            probe: self.proxy_probe,
            tasks: Mutex::new(Vec::new()),
            flush_watcher: Mutex::new(None),
        })
    }
}

/// The classifier, breaker, proxy pool, cache and orchestrator of one
/// process, plus the background tasks that maintain them.
pub struct ResilienceServices<C: Clock = SystemClock> {
    config: Config,
    classifier: Arc<ErrorClassifier<C>>,
    breaker: Arc<DomainCircuitBreaker<C>>,
    proxies: Arc<ProxyManager<C>>,
    cache: Arc<ScrapeCache<C>>,
    orchestrator: Arc<RetryOrchestrator<C>>,
    probe: Option<Arc<dyn ProxyProbe>>,
    tasks: Mutex<Vec<PeriodicTask>>,
    flush_watcher: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl ResilienceServices<SystemClock> {
    pub fn builder(config: Config) -> ResilienceServicesBuilder<SystemClock> {
        ResilienceServicesBuilder {
            config,
            clock: SystemClock,
            metrics: Arc::new(NoOpMetricsCollector),
            proxy_store: None,
            proxy_probe: None,
            cache_backend: None,
            captcha: None,
        }
    }
}

impl<C: Clock> ResilienceServices<C> {
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn classifier(&self) -> &Arc<ErrorClassifier<C>> {
        &self.classifier
    }

    pub fn breaker(&self) -> &Arc<DomainCircuitBreaker<C>> {
        &self.breaker
    }

    pub fn proxies(&self) -> &Arc<ProxyManager<C>> {
        &self.proxies
    }

    pub fn cache(&self) -> &Arc<ScrapeCache<C>> {
        &self.cache
    }

    pub fn orchestrator(&self) -> &Arc<RetryOrchestrator<C>> {
        &self.orchestrator
    }

    /// Loads persisted state and spawns the maintenance tasks.
    pub async fn start(&self) -> Result<()> {
        if !self.tasks.lock().is_empty() {
            return Err(ScrapeShieldError::Internal("services already started".into()));
        }

        let proxies = self.proxies.load().await?;
        let cached = self.cache.rehydrate().await?;

        let pool = &self.config.proxy_pool;
        let cache = &self.config.cache;
        let flush: Arc<dyn PeriodicJob> = Arc::new(ProxyFlushJob::new(Arc::clone(&self.proxies)));
        let sweep: Arc<dyn PeriodicJob> = Arc::new(CacheSweepJob::new(Arc::clone(&self.cache)));
        let purge: Arc<dyn PeriodicJob> = Arc::new(CachePurgeJob::new(Arc::clone(&self.cache)));
        let mut jobs: Vec<(&str, Duration, Arc<dyn PeriodicJob>)> = vec![
            ("proxy-flush", pool.flush_interval, flush),
            ("cache-sweep", cache.sweep_interval, sweep),
            ("cache-purge", cache.purge_interval, purge),
        ];
        if let Some(probe) = &self.probe {
            let health: Arc<dyn PeriodicJob> =
                Arc::new(HealthCheckJob::new(Arc::clone(&self.proxies), Arc::clone(probe)));
            jobs.push(("proxy-health", pool.health_check_interval, health));
        } else {
            warn!("No proxy probe configured; health checks disabled");
        }

        let mut started = Vec::with_capacity(jobs.len());
        for (name, interval, job) in jobs {
            let mut task = PeriodicTask::new(name, PeriodicTaskConfig::every(interval), job);
            task.start().map_err(|err| ScrapeShieldError::Internal(err.to_string()))?;
            started.push(task);
        }
        let count = started.len();
        *self.tasks.lock() = started;

        let cancel = CancellationToken::new();
        let watcher = {
            let manager = Arc::clone(&self.proxies);
            let cancel = cancel.clone();
            tokio::spawn(async move { manager.flush_on_change(cancel).await })
        };
        *self.flush_watcher.lock() = Some((cancel, watcher));

        info!(proxies = proxies, cached = cached, tasks = count, "Resilience services started");
        Ok(())
    }

    /// Stops the maintenance tasks, then flushes the proxy pool and persists
    /// the cache.
    ///
    /// Every step runs even when an earlier one fails; the first error is
    /// returned.
    pub async fn shutdown(&self) -> Result<()> {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for mut task in tasks {
            if let Err(err) = task.stop().await {
                warn!(task = task.name(), error = %err, "Task did not stop cleanly");
            }
        }
        let watcher = self.flush_watcher.lock().take();
        if let Some((cancel, handle)) = watcher {
            cancel.cancel();
            if let Err(err) = handle.await {
                warn!(error = %err, "Proxy change watcher did not stop cleanly");
            }
        }

        let flushed = self.proxies.flush().await;
        let persisted = self.cache.persist().await;
        info!("Resilience services stopped");
        flushed.and(persisted).map(|_| ())
    }

    /// Cache-first fetch.
    ///
    /// A live cache entry under `key` is returned without running
    /// `operation`. Otherwise the operation runs under the orchestrator and a
    /// successful value is cached with the default TTL. Cache failures are
    /// logged and never fail the fetch.
    pub async fn fetch<T, F, Fut>(
        &self,
        key: &str,
        context: &RetryContext,
        operation: F,
    ) -> std::result::Result<Fetched<T>, ClassifiedError>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(RetryState) -> Fut,
        Fut: Future<Output = std::result::Result<T, ScrapeError>>,
    {
        match self.cache.get_as::<T>(key) {
            Ok(Some(value)) => return Ok(Fetched { value, cached: true, retry_count: 0 }),
            Ok(None) => {}
            Err(err) => warn!(key = key, error = %err, "Ignoring unreadable cache entry"),
        }

        let outcome = self.orchestrator.with_retry(context, operation).await?;
        if let Err(err) = self.cache.set_serialized(key, &outcome.value, None) {
            warn!(key = key, error = %err, "Failed to cache fetched value");
        }
        Ok(Fetched { value: outcome.value, cached: false, retry_count: outcome.retry_count })
    }
}

impl<C: Clock> Drop for ResilienceServices<C> {
    fn drop(&mut self) {
        if let Some((cancel, _)) = self.flush_watcher.get_mut().take() {
            cancel.cancel();
        }
    }
}
