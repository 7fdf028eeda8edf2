//! Proxy health checks and background pool jobs

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use rand::seq::SliceRandom;
use scrapeshield_common::{Clock, JobError, PeriodicJob};
use scrapeshield_domain::{PoolSet, Proxy};
use tracing::{debug, info, warn};

use super::manager::ProxyManager;
use super::ports::{ProbeResult, ProxyProbe};
use super::scoring;

/// Result of one health-check round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthReport {
    pub checked: usize,
    /// Active proxies moved to disabled.
    pub demoted: usize,
    /// Disabled or backup proxies moved to active.
    pub promoted: usize,
}

impl<C: Clock> ProxyManager<C> {
    /// Probes the pool and moves proxies between sets.
    ///
    /// Every active proxy is probed, plus a random sample of disabled proxies
    /// whose minimum ban has elapsed, plus the backup set when the active
    /// set is below its minimum size. Failing active proxies are disabled;
    /// passing disabled or backup proxies become active. Probes run
    /// concurrently up to the configured limit.
    pub async fn run_health_checks(&self, probe: &dyn ProxyProbe) -> HealthReport {
        let targets = self.health_check_targets();
        if targets.is_empty() {
            return HealthReport::default();
        }

        let url = self.settings.health_check_url.clone();
        let timeout = self.settings.health_check_timeout;
        let concurrency = self.settings.health_check_concurrency.max(1);

        let results: Vec<(String, PoolSet, ProbeResult)> = stream::iter(targets)
            .map(|(proxy, set)| {
                let url = url.as_str();
                async move {
                    let result = probe.probe(&proxy, url, timeout).await;
                    (proxy.id, set, result)
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut report = HealthReport { checked: results.len(), ..HealthReport::default() };
        let mut demoted = Vec::new();
        {
            let now = self.clock.utc_now();
            let mut pool = self.pool.write();
            for (id, probed_from, result) in &results {
                let Some(entry) = pool.entries.get_mut(id) else {
                    continue;
                };
                // the request path may have moved it while the probe ran
                if entry.set != *probed_from {
                    continue;
                }
                entry.stats.last_tested = Some(now);
                match (entry.set, result.ok) {
                    (PoolSet::Active, true) => {}
                    (PoolSet::Active, false) => {
                        entry.set = PoolSet::Disabled;
                        entry.stats.banned_at = Some(now);
                        report.demoted += 1;
                        demoted.push(id.as_str());
                        warn!(proxy = %id, error = ?result.error, "Health check failed; disabling proxy");
                    }
                    (PoolSet::Disabled | PoolSet::Backup, true) => {
                        entry.set = PoolSet::Active;
                        entry.stats.consecutive_failures = 0;
                        entry.stats.banned_at = None;
                        report.promoted += 1;
                        info!(proxy = %id, "Health check passed; proxy reactivated");
                    }
                    (PoolSet::Disabled, false) => {
                        entry.stats.banned_at = Some(now);
                    }
                    (PoolSet::Backup, false) => {}
                }
                scoring::refresh(&mut entry.stats, now);
            }
            for id in demoted {
                pool.unbind_proxy(id);
            }
            pool.dirty = true;
        }

        self.publish_sizes();
        if report.demoted > 0 || report.promoted > 0 {
            if let Err(err) = self.flush().await {
                warn!(error = %err, "Failed to persist health check results");
            }
        }
        debug!(checked = report.checked, demoted = report.demoted, promoted = report.promoted, "Health check round complete");
        report
    }

    fn health_check_targets(&self) -> Vec<(Proxy, PoolSet)> {
        let now = self.clock.utc_now();
        let min_ban = self.settings.min_ban_duration;
        let pool = self.pool.read();

        let mut targets: Vec<(Proxy, PoolSet)> = pool
            .in_order()
            .filter(|entry| entry.set == PoolSet::Active)
            .map(|entry| (entry.proxy.clone(), PoolSet::Active))
            .collect();

        let mut eligible: Vec<Proxy> = pool
            .in_order()
            .filter(|entry| entry.set == PoolSet::Disabled && entry.proxy.enabled)
            .filter(|entry| {
                entry.stats.banned_at.map_or(true, |banned_at| {
                    (now - banned_at).to_std().is_ok_and(|elapsed| elapsed >= min_ban)
                })
            })
            .map(|entry| entry.proxy.clone())
            .collect();
        eligible.shuffle(&mut rand::thread_rng());
        eligible.truncate(self.settings.disabled_sample_size);
        targets.extend(eligible.into_iter().map(|proxy| (proxy, PoolSet::Disabled)));

        if pool.sizes().active < self.settings.min_active_proxies {
            targets.extend(
                pool.in_order()
                    .filter(|entry| entry.set == PoolSet::Backup && entry.proxy.enabled)
                    .map(|entry| (entry.proxy.clone(), PoolSet::Backup)),
            );
        }
        targets
    }
}

/// Periodic health-check round.
pub struct HealthCheckJob<C: Clock> {
    manager: Arc<ProxyManager<C>>,
    probe: Arc<dyn ProxyProbe>,
}

impl<C: Clock> HealthCheckJob<C> {
    pub fn new(manager: Arc<ProxyManager<C>>, probe: Arc<dyn ProxyProbe>) -> Self {
        Self { manager, probe }
    }
}

#[async_trait]
impl<C: Clock> PeriodicJob for HealthCheckJob<C> {
    async fn run(&self) -> Result<(), JobError> {
        self.manager.run_health_checks(self.probe.as_ref()).await;
        Ok(())
    }
}

/// Periodic write-back of dirty pool state.
pub struct ProxyFlushJob<C: Clock> {
    manager: Arc<ProxyManager<C>>,
}

impl<C: Clock> ProxyFlushJob<C> {
    pub fn new(manager: Arc<ProxyManager<C>>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl<C: Clock> PeriodicJob for ProxyFlushJob<C> {
    async fn run(&self) -> Result<(), JobError> {
        self.manager.flush().await?;
        Ok(())
    }
}
