//! Scored proxy pool with domain affinity
//!
//! The pool keeps every proxy in exactly one of three sets:
//!
//! - **active**: eligible for selection
//! - **disabled**: banned or failing; returns to active only through a
//!   passing health check after the minimum ban duration
//! - **backup**: held in reserve; promoted when the active set runs dry
//!
//! All mutation goes through one pool lock, so set moves, statistics and
//! affinity updates are atomic with respect to each other.
//!
//! Structural changes (additions, removals, set moves) wake
//! [`ProxyManager::flush_on_change`]; statistics-only updates wait for the
//! periodic flush.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use scrapeshield_common::observability::names;
use scrapeshield_common::{Clock, MetricsCollector, NoOpMetricsCollector, SystemClock};
use scrapeshield_domain::constants::DEFAULT_CACHE_DOMAIN;
use scrapeshield_domain::{
    ErrorKind, PoolSet, PoolSizes, Proxy, ProxyPoolSettings, ProxyRecord, ProxyStats, ProxyType,
    Result,
};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::ports::ProxyStore;
use super::scoring;
use super::selection::{self, Candidate};
use crate::net::domain_or;

/// Filters and binding options for [`ProxyManager::get_proxy`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyRequest {
    pub country: Option<String>,
    pub tags: Vec<String>,
    pub proxy_type: Option<ProxyType>,
    /// Bind the chosen proxy to the request's domain for later calls.
    pub bind_to_site: bool,
    /// Avoid the proxy last used for this domain.
    pub enforce_unique: bool,
    /// Never return this proxy unless nothing else is left (rotation).
    pub exclude: Option<String>,
}

impl ProxyRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn proxy_type(mut self, proxy_type: ProxyType) -> Self {
        self.proxy_type = Some(proxy_type);
        self
    }

    pub fn bind_to_site(mut self, bind: bool) -> Self {
        self.bind_to_site = bind;
        self
    }

    pub fn enforce_unique(mut self, unique: bool) -> Self {
        self.enforce_unique = unique;
        self
    }

    pub fn exclude(mut self, id: impl Into<String>) -> Self {
        self.exclude = Some(id.into());
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PoolEntry {
    pub(crate) proxy: Proxy,
    pub(crate) stats: ProxyStats,
    pub(crate) set: PoolSet,
}

#[derive(Debug, Default)]
pub(crate) struct ProxyPool {
    pub(crate) entries: HashMap<String, PoolEntry>,
    /// Insertion order; selection and persistence iterate in this order.
    pub(crate) order: Vec<String>,
    affinity: HashMap<String, String>,
    last_proxy: HashMap<String, String>,
    cursor: usize,
    pub(crate) dirty: bool,
}

impl ProxyPool {
    pub(crate) fn sizes(&self) -> PoolSizes {
        let mut sizes = PoolSizes::default();
        for entry in self.entries.values() {
            match entry.set {
                PoolSet::Active => sizes.active += 1,
                PoolSet::Disabled => sizes.disabled += 1,
                PoolSet::Backup => sizes.backup += 1,
            }
        }
        sizes
    }

    pub(crate) fn in_order(&self) -> impl Iterator<Item = &PoolEntry> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    fn records(&self) -> Vec<ProxyRecord> {
        self.in_order()
            .map(|entry| ProxyRecord {
                proxy: entry.proxy.clone(),
                stats: entry.stats.clone(),
                set: Some(entry.set),
                backup: entry.set == PoolSet::Backup,
            })
            .collect()
    }

    fn insert(&mut self, entry: PoolEntry) {
        let id = entry.proxy.id.clone();
        if self.entries.insert(id.clone(), entry).is_none() {
            self.order.push(id);
        }
        self.dirty = true;
    }

    /// Removes every affinity binding to `id`.
    pub(crate) fn unbind_proxy(&mut self, id: &str) {
        self.affinity.retain(|_, bound| bound != id);
    }
}

/// Level `n` drops the first `n` filters: uniqueness, tags, type, country.
const RELAXATION_LEVELS: usize = 4;

fn matches_level(
    entry: &PoolEntry,
    request: &ProxyRequest,
    avoid: &[&str],
    level: usize,
) -> bool {
    if level < 1 && avoid.contains(&entry.proxy.id.as_str()) {
        return false;
    }
    if level < 2 && !entry.proxy.has_tags(&request.tags) {
        return false;
    }
    if level < 3 && request.proxy_type.is_some_and(|t| entry.proxy.proxy_type != t) {
        return false;
    }
    if level < 4 && request.country.as_deref().is_some_and(|c| !entry.proxy.in_country(c)) {
        return false;
    }
    true
}

/// Proxy pool manager.
pub struct ProxyManager<C: Clock = SystemClock> {
    pub(crate) pool: RwLock<ProxyPool>,
    pub(crate) settings: ProxyPoolSettings,
    store: Option<Arc<dyn ProxyStore>>,
    pub(crate) metrics: Arc<dyn MetricsCollector>,
    pub(crate) clock: C,
    changed: Notify,
}

impl<C: Clock> fmt::Debug for ProxyManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyManager")
            .field("strategy", &self.settings.strategy)
            .field("sizes", &self.pool_sizes())
            .finish()
    }
}

impl ProxyManager<SystemClock> {
    pub fn new(settings: ProxyPoolSettings) -> Self {
        Self::with_clock(settings, SystemClock)
    }
}

impl<C: Clock> ProxyManager<C> {
    pub fn with_clock(settings: ProxyPoolSettings, clock: C) -> Self {
        Self {
            pool: RwLock::new(ProxyPool::default()),
            settings,
            store: None,
            metrics: Arc::new(NoOpMetricsCollector),
            clock,
            changed: Notify::new(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ProxyStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn settings(&self) -> &ProxyPoolSettings {
        &self.settings
    }

    /// Replaces the pool with the store's contents.
    pub async fn load(&self) -> Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let records = store.load().await?;
        let now = self.clock.utc_now();
        let mut pool = ProxyPool::default();
        let mut assigned_ids = false;
        for record in records {
            let set = record.initial_set();
            let mut proxy = record.proxy;
            if proxy.id.trim().is_empty() {
                proxy.id = Uuid::new_v4().to_string();
                assigned_ids = true;
            }
            let mut stats = record.stats;
            scoring::refresh(&mut stats, now);
            pool.insert(PoolEntry { proxy, stats, set });
        }
        pool.dirty = assigned_ids;
        let loaded = pool.entries.len();
        *self.pool.write() = pool;

        self.publish_sizes();
        info!(proxies = loaded, "Loaded proxy pool");
        Ok(loaded)
    }

    /// Writes the pool to the store when its membership or statistics changed
    /// since the last flush.
    ///
    /// Returns whether anything was written.
    pub async fn flush(&self) -> Result<bool> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        let records = {
            let mut pool = self.pool.write();
            if !pool.dirty {
                return Ok(false);
            }
            pool.dirty = false;
            pool.records()
        };
        if let Err(err) = store.save(&records).await {
            self.pool.write().dirty = true;
            warn!(error = %err, "Failed to flush proxy pool");
            return Err(err);
        }
        debug!(proxies = records.len(), "Flushed proxy pool");
        Ok(true)
    }

    /// Flushes after every structural change until `cancel` fires.
    ///
    /// Changes that land while a flush is running coalesce into one more
    /// flush.
    pub async fn flush_on_change(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = self.changed.notified() => {
                    // failures are logged by flush and leave the pool dirty
                    let _ = self.flush().await;
                }
            }
        }
        debug!("Proxy change watcher stopped");
    }

    fn structure_changed(&self) {
        self.publish_sizes();
        self.changed.notify_one();
    }

    /// Adds or replaces a proxy; an empty id gets a generated one.
    pub fn add_proxy(&self, mut proxy: Proxy, set: PoolSet) -> String {
        if proxy.id.trim().is_empty() {
            proxy.id = Uuid::new_v4().to_string();
        }
        let id = proxy.id.clone();
        let mut stats = ProxyStats::default();
        scoring::refresh(&mut stats, self.clock.utc_now());
        self.pool.write().insert(PoolEntry { proxy, stats, set });
        self.structure_changed();
        id
    }

    pub fn remove_proxy(&self, id: &str) -> Option<Proxy> {
        let removed = {
            let mut pool = self.pool.write();
            let removed = pool.entries.remove(id)?;
            pool.order.retain(|existing| existing != id);
            pool.unbind_proxy(id);
            pool.last_proxy.retain(|_, last| last != id);
            pool.dirty = true;
            removed
        };
        self.structure_changed();
        Some(removed.proxy)
    }

    /// Picks a proxy for `url`.
    ///
    /// An active proxy bound to the domain always wins, unless it is the one
    /// being rotated away from. Otherwise filters are relaxed one at a time
    /// (uniqueness, tags, type, country) until something matches; an empty
    /// active set promotes one backup.
    pub fn get_proxy(&self, url: &str, request: &ProxyRequest) -> Option<Proxy> {
        let domain = domain_or(url, DEFAULT_CACHE_DOMAIN);
        let mut guard = self.pool.write();
        let pool = &mut *guard;

        if let Some(bound) = pool.affinity.get(&domain).cloned() {
            let rotating_away = request.exclude.as_deref() == Some(bound.as_str());
            match pool.entries.get(&bound) {
                Some(entry) if entry.set == PoolSet::Active && !rotating_away => {
                    let proxy = entry.proxy.clone();
                    pool.last_proxy.insert(domain, bound);
                    return Some(proxy);
                }
                _ => {
                    pool.affinity.remove(&domain);
                    debug!(domain = %domain, proxy = %bound, "Dropped proxy binding");
                }
            }
        }

        let mut avoid: Vec<&str> = Vec::new();
        if let Some(excluded) = request.exclude.as_deref() {
            avoid.push(excluded);
        }
        if request.enforce_unique {
            if let Some(last) = pool.last_proxy.get(&domain) {
                avoid.push(last.as_str());
            }
        }

        let mut candidates: Vec<Candidate> = Vec::new();
        for level in 0..=RELAXATION_LEVELS {
            candidates = pool
                .in_order()
                .filter(|entry| entry.set == PoolSet::Active)
                .filter(|entry| matches_level(entry, request, &avoid, level))
                .map(|entry| Candidate { id: entry.proxy.id.clone(), score: entry.stats.score })
                .collect();
            if !candidates.is_empty() {
                if level > 0 {
                    debug!(domain = %domain, level = level, "Relaxed proxy filters");
                }
                break;
            }
        }
        drop(avoid);

        let promoted = candidates.is_empty();
        let chosen = if promoted {
            Self::promote_backup(pool)?
        } else {
            let mut rng = rand::thread_rng();
            selection::select(self.settings.strategy, &candidates, &mut pool.cursor, &mut rng)?
        };

        let proxy = pool.entries.get(&chosen)?.proxy.clone();
        pool.last_proxy.insert(domain.clone(), chosen.clone());
        if request.bind_to_site {
            pool.affinity.insert(domain, chosen);
        }
        drop(guard);

        if promoted {
            self.structure_changed();
        }
        Some(proxy)
    }

    /// Moves the best-scoring backup into the active set.
    fn promote_backup(pool: &mut ProxyPool) -> Option<String> {
        let id = pool
            .in_order()
            .filter(|entry| entry.set == PoolSet::Backup && entry.proxy.enabled)
            .max_by(|a, b| a.stats.score.total_cmp(&b.stats.score))
            .map(|entry| entry.proxy.id.clone())?;
        if let Some(entry) = pool.entries.get_mut(&id) {
            entry.set = PoolSet::Active;
        }
        pool.dirty = true;
        info!(proxy = %id, "Promoted backup proxy; active pool was empty");
        Some(id)
    }

    /// Folds a successful request into the proxy's statistics.
    pub fn record_success(&self, id: &str, response_time: Duration) {
        let now = self.clock.utc_now();
        let mut pool = self.pool.write();
        if let Some(entry) = pool.entries.get_mut(id) {
            entry.stats.record_success(response_time.as_secs_f64() * 1000.0, now);
            scoring::refresh(&mut entry.stats, now);
            pool.dirty = true;
        }
    }

    /// Folds a failed request into the proxy's statistics.
    ///
    /// `ProxyBanned` disables immediately; otherwise the proxy is disabled
    /// once its consecutive failures reach the threshold. Returns whether the
    /// proxy was disabled by this call.
    pub fn record_failure(&self, id: &str, kind: Option<ErrorKind>) -> bool {
        if kind == Some(ErrorKind::ProxyBanned) {
            let _ = self.with_entry(id, |entry, now| {
                entry.stats.record_failure(now);
            });
            return self.mark_proxy_banned(id);
        }

        let now = self.clock.utc_now();
        let disabled = {
            let mut pool = self.pool.write();
            let Some(entry) = pool.entries.get_mut(id) else {
                return false;
            };
            entry.stats.record_failure(now);
            scoring::refresh(&mut entry.stats, now);
            let trips = entry.set == PoolSet::Active
                && entry.stats.consecutive_failures >= self.settings.failure_threshold;
            if trips {
                entry.set = PoolSet::Disabled;
                entry.stats.banned_at = Some(now);
                pool.unbind_proxy(id);
            }
            pool.dirty = true;
            trips
        };

        if disabled {
            warn!(proxy = id, kind = ?kind, "Disabled proxy after consecutive failures");
            self.structure_changed();
        }
        disabled
    }

    /// Disables a proxy immediately regardless of its failure count.
    pub fn mark_proxy_banned(&self, id: &str) -> bool {
        let now = self.clock.utc_now();
        let banned = {
            let mut pool = self.pool.write();
            let Some(entry) = pool.entries.get_mut(id) else {
                return false;
            };
            entry.set = PoolSet::Disabled;
            entry.stats.banned_at = Some(now);
            entry.stats.ban_count = entry.stats.ban_count.saturating_add(1);
            scoring::refresh(&mut entry.stats, now);
            let ban_count = entry.stats.ban_count;
            pool.unbind_proxy(id);
            pool.dirty = true;
            ban_count
        };
        self.metrics.increment_counter(names::PROXY_BANS_TOTAL, &[]);
        warn!(proxy = id, ban_count = banned, "Proxy banned");
        self.structure_changed();
        true
    }

    /// Binds `domain` to `id`; fails when the proxy is unknown or inactive.
    pub fn bind(&self, domain: &str, id: &str) -> bool {
        let mut pool = self.pool.write();
        let active = pool.entries.get(id).is_some_and(|entry| entry.set == PoolSet::Active);
        if active {
            pool.affinity.insert(domain.to_ascii_lowercase(), id.to_string());
        }
        active
    }

    pub fn unbind(&self, domain: &str) -> Option<String> {
        self.pool.write().affinity.remove(&domain.to_ascii_lowercase())
    }

    pub fn bound_proxy(&self, domain: &str) -> Option<String> {
        self.pool.read().affinity.get(&domain.to_ascii_lowercase()).cloned()
    }

    pub fn pool_sizes(&self) -> PoolSizes {
        self.pool.read().sizes()
    }

    pub fn proxy_set(&self, id: &str) -> Option<PoolSet> {
        self.pool.read().entries.get(id).map(|entry| entry.set)
    }

    pub fn proxy_stats(&self, id: &str) -> Option<ProxyStats> {
        self.pool.read().entries.get(id).map(|entry| entry.stats.clone())
    }

    /// Every proxy with its statistics and set, in pool order.
    pub fn records(&self) -> Vec<ProxyRecord> {
        self.pool.read().records()
    }

    pub fn is_dirty(&self) -> bool {
        self.pool.read().dirty
    }

    pub(crate) fn with_entry<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut PoolEntry, chrono::DateTime<chrono::Utc>) -> T,
    ) -> Option<T> {
        let now = self.clock.utc_now();
        let mut pool = self.pool.write();
        pool.entries.get_mut(id).map(|entry| f(entry, now))
    }

    pub(crate) fn publish_sizes(&self) {
        let sizes = self.pool_sizes();
        for (set, size) in [
            (PoolSet::Active, sizes.active),
            (PoolSet::Disabled, sizes.disabled),
            (PoolSet::Backup, sizes.backup),
        ] {
            self.metrics.record_gauge(names::PROXY_POOL_SIZE, size as f64, &[("set", set.as_str())]);
        }
    }
}
