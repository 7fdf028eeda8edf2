//! TTL- and capacity-bounded scrape cache

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use scrapeshield_common::observability::names;
use scrapeshield_common::{Clock, MetricsCollector, NoOpMetricsCollector, SystemClock};
use scrapeshield_domain::{CacheEntry, CacheSettings, Result, ScrapeShieldError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::key::{domain_of_key, CacheKeyBuilder};
use super::ports::CacheBackend;

#[derive(Debug, Clone)]
struct StoredEntry {
    entry: CacheEntry,
    /// Insertion sequence; breaks ties between equal timestamps.
    seq: u64,
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub hashed_keys: u64,
}

impl CacheStats {
    /// Hits over lookups; 0 before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

/// In-process cache for scrape results.
///
/// Expired entries are dropped lazily on read and in bulk by
/// [`purge_expired`](Self::purge_expired). Per-domain capacity is enforced
/// by [`enforce_capacity`](Self::enforce_capacity), which evicts the oldest
/// entries by creation time.
pub struct ScrapeCache<C: Clock = SystemClock> {
    entries: DashMap<String, StoredEntry>,
    seq: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    settings: CacheSettings,
    keys: CacheKeyBuilder,
    backend: Option<Arc<dyn CacheBackend>>,
    metrics: Arc<dyn MetricsCollector>,
    clock: C,
}

impl<C: Clock> fmt::Debug for ScrapeCache<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScrapeCache")
            .field("entries", &self.entries.len())
            .field("settings", &self.settings)
            .finish()
    }
}

impl ScrapeCache<SystemClock> {
    pub fn new(settings: CacheSettings) -> Self {
        Self::with_clock(settings, SystemClock)
    }
}

impl<C: Clock> ScrapeCache<C> {
    pub fn with_clock(settings: CacheSettings, clock: C) -> Self {
        Self {
            entries: DashMap::new(),
            seq: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            settings,
            keys: CacheKeyBuilder::new(),
            backend: None,
            metrics: Arc::new(NoOpMetricsCollector),
            clock,
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// See [`CacheKeyBuilder::create_key`].
    pub fn create_key(&self, namespace: &str, identifier: &str) -> String {
        let before = self.keys.hashed_count();
        let key = self.keys.create_key(namespace, identifier);
        if self.keys.hashed_count() > before {
            self.metrics.increment_counter(names::CACHE_KEYS_HASHED_TOTAL, &[]);
        }
        key
    }

    /// Live value for `key`.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let now = self.clock.utc_now();
        let found = self
            .entries
            .get(key)
            .map(|stored| (!stored.entry.is_expired(now)).then(|| stored.entry.value.clone()));
        let value = match found {
            Some(Some(value)) => Some(value),
            Some(None) => {
                if self.entries.remove_if(key, |_, stored| stored.entry.is_expired(now)).is_some()
                {
                    self.expirations.fetch_add(1, Ordering::Relaxed);
                }
                None
            }
            None => None,
        };

        let counter = if value.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        let result = if value.is_some() { "hit" } else { "miss" };
        self.metrics.increment_counter(names::CACHE_REQUESTS_TOTAL, &[("result", result)]);
        self.metrics.record_gauge(names::CACHE_HIT_RATE, self.stats().hit_rate(), &[]);
        value
    }

    /// Stores `value` under `key`, replacing any previous entry.
    ///
    /// `ttl` defaults to the configured TTL.
    pub fn set(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.settings.default_ttl);
        let entry = CacheEntry {
            key: key.to_string(),
            value,
            created_at: self.clock.utc_now(),
            domain: domain_of_key(key).to_string(),
            ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
        };
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(key.to_string(), StoredEntry { entry, seq });
    }

    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Typed lookup; a stored value that does not deserialize is an error.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)
            .map(|value| {
                serde_json::from_value(value).map_err(|err| {
                    ScrapeShieldError::InvalidInput(format!("cached value for {key}: {err}"))
                })
            })
            .transpose()
    }

    pub fn set_serialized<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()> {
        let value = serde_json::to_value(value).map_err(|err| {
            ScrapeShieldError::InvalidInput(format!("value for {key} is not serializable: {err}"))
        })?;
        self.set(key, value, ttl);
        Ok(())
    }

    /// Drops every entry in `domain`; returns how many were removed.
    pub fn invalidate_domain(&self, domain: &str) -> usize {
        let domain = domain.to_ascii_lowercase();
        let before = self.entries.len();
        self.entries.retain(|_, stored| stored.entry.domain != domain);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            info!(domain = %domain, removed = removed, "Invalidated cached domain");
        }
        removed
    }

    /// Drops every expired entry.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.utc_now();
        let before = self.entries.len();
        self.entries.retain(|_, stored| !stored.entry.is_expired(now));
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            self.expirations.fetch_add(purged as u64, Ordering::Relaxed);
            debug!(purged = purged, "Purged expired cache entries");
        }
        purged
    }

    /// Evicts the oldest entries of every domain over its capacity.
    pub fn enforce_capacity(&self) -> usize {
        let mut by_domain: HashMap<String, Vec<(chrono::DateTime<chrono::Utc>, u64, String)>> =
            HashMap::new();
        for stored in self.entries.iter() {
            by_domain.entry(stored.entry.domain.clone()).or_default().push((
                stored.entry.created_at,
                stored.seq,
                stored.key().clone(),
            ));
        }

        let mut evicted = 0;
        for (domain, mut keys) in by_domain {
            let limit = self.settings.max_items_for(&domain);
            if keys.len() <= limit {
                continue;
            }
            keys.sort_unstable_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
            let overflow = keys.len() - limit;
            let mut removed = 0;
            for (_, _, key) in keys.into_iter().take(overflow) {
                if self.entries.remove(&key).is_some() {
                    removed += 1;
                }
            }
            evicted += removed;
            for _ in 0..removed {
                self.metrics.increment_counter(names::CACHE_EVICTIONS_TOTAL, &[("domain", &domain)]);
            }
            debug!(domain = %domain, evicted = removed, limit = limit, "Evicted cache entries over capacity");
        }
        self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries currently held for `domain`, expired or not.
    pub fn domain_len(&self, domain: &str) -> usize {
        self.entries.iter().filter(|stored| stored.entry.domain == domain).count()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            hashed_keys: self.keys.hashed_count(),
        }
    }

    /// Loads live entries from the backend; returns how many were restored.
    pub async fn rehydrate(&self) -> Result<usize> {
        let Some(backend) = &self.backend else {
            return Ok(0);
        };
        let mut loaded = backend.load().await?;
        let now = self.clock.utc_now();
        loaded.retain(|entry| !entry.is_expired(now));
        loaded.sort_by_key(|entry| entry.created_at);

        let restored = loaded.len();
        for entry in loaded {
            let seq = self.seq.fetch_add(1, Ordering::Relaxed);
            self.entries.insert(entry.key.clone(), StoredEntry { entry, seq });
        }
        info!(entries = restored, "Rehydrated cache");
        Ok(restored)
    }

    /// Writes live entries to the backend, oldest first.
    pub async fn persist(&self) -> Result<usize> {
        let Some(backend) = &self.backend else {
            return Ok(0);
        };
        let now = self.clock.utc_now();
        let mut live: Vec<(u64, CacheEntry)> = self
            .entries
            .iter()
            .filter(|stored| !stored.entry.is_expired(now))
            .map(|stored| (stored.seq, stored.entry.clone()))
            .collect();
        live.sort_by(|a, b| (a.1.created_at, a.0).cmp(&(b.1.created_at, b.0)));
        let entries: Vec<CacheEntry> = live.into_iter().map(|(_, entry)| entry).collect();

        if let Err(err) = backend.save(&entries).await {
            warn!(error = %err, "Failed to persist cache");
            return Err(err);
        }
        debug!(entries = entries.len(), "Persisted cache");
        Ok(entries.len())
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use scrapeshield_common::{InMemoryMetricsCollector, MockClock};
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    fn cache(clock: MockClock) -> ScrapeCache<MockClock> {
        ScrapeCache::with_clock(CacheSettings::default(), clock)
    }

    #[derive(Default)]
    struct MemoryBackend {
        saved: Mutex<Vec<CacheEntry>>,
    }

    #[async_trait::async_trait]
    impl CacheBackend for MemoryBackend {
        async fn load(&self) -> Result<Vec<CacheEntry>> {
            Ok(self.saved.lock().clone())
        }

        async fn save(&self, entries: &[CacheEntry]) -> Result<()> {
            *self.saved.lock() = entries.to_vec();
            Ok(())
        }
    }

    /// Validates `ScrapeCache::get` behavior for the TTL boundary scenario.
    ///
    /// Assertions:
    /// - Confirms the value is served up to and including the TTL.
    /// - Confirms the entry is gone once the TTL has passed.
    #[test]
    fn test_ttl_expiry_is_lazy_on_read() {
        let clock = MockClock::new();
        let cache = cache(clock.clone());
        cache.set("product:site.com:a", json!({"price": 10}), Some(Duration::from_secs(1)));

        clock.advance_millis(1000);
        assert_eq!(cache.get("product:site.com:a"), Some(json!({"price": 10})));

        clock.advance_millis(1);
        assert_eq!(cache.get("product:site.com:a"), None);
        assert!(cache.is_empty());

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.expirations), (1, 1, 1));
        assert!((stats.hit_rate() - 0.5).abs() < 1e-9);
    }

    /// Validates `ScrapeCache::enforce_capacity` behavior for a domain one
    /// over its limit.
    ///
    /// Assertions:
    /// - Confirms exactly one entry is evicted.
    /// - Confirms the evicted entry is the oldest by creation time.
    /// - Confirms other domains are untouched.
    #[test]
    fn test_capacity_evicts_oldest_first() {
        let clock = MockClock::new();
        let mut settings = CacheSettings::default();
        settings.domain_limits.insert("site.com".into(), 3);
        let metrics = Arc::new(InMemoryMetricsCollector::new());
        let cache = ScrapeCache::with_clock(settings, clock.clone()).with_metrics(metrics.clone());

        for n in 0..4 {
            cache.set(&format!("product:site.com:{n}"), json!(n), None);
            clock.advance_millis(10);
        }
        cache.set("product:other.com:x", json!("x"), None);

        assert_eq!(cache.enforce_capacity(), 1);
        assert_eq!(cache.get("product:site.com:0"), None);
        assert_eq!(cache.domain_len("site.com"), 3);
        assert_eq!(cache.domain_len("other.com"), 1);
        assert_eq!(metrics.counter(names::CACHE_EVICTIONS_TOTAL, &[("domain", "site.com")]), 1);
    }

    #[test]
    fn test_equal_timestamps_evict_by_insertion_order() {
        let clock = MockClock::new();
        let mut settings = CacheSettings::default();
        settings.max_items_per_domain = 2;
        let cache = ScrapeCache::with_clock(settings, clock);

        for n in ["first", "second", "third"] {
            cache.set(&format!("ns:d.com:{n}"), json!(n), None);
        }
        cache.enforce_capacity();
        assert!(cache.get("ns:d.com:first").is_none());
        assert!(cache.get("ns:d.com:third").is_some());
    }

    #[test]
    fn test_set_refreshes_creation_time() {
        let clock = MockClock::new();
        let cache = cache(clock.clone());
        cache.set("ns:d.com:k", json!(1), Some(Duration::from_secs(10)));
        clock.advance(Duration::from_secs(8));
        cache.set("ns:d.com:k", json!(2), Some(Duration::from_secs(10)));
        clock.advance(Duration::from_secs(8));
        assert_eq!(cache.get("ns:d.com:k"), Some(json!(2)));
    }

    #[test]
    fn test_purge_and_invalidate() {
        let clock = MockClock::new();
        let cache = cache(clock.clone());
        cache.set("ns:a.com:1", json!(1), Some(Duration::from_secs(1)));
        cache.set("ns:a.com:2", json!(2), None);
        cache.set("ns:b.com:1", json!(3), None);

        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.invalidate_domain("A.com"), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.delete("ns:b.com:1"));
        assert!(!cache.delete("ns:b.com:1"));
    }

    #[test]
    fn test_typed_helpers() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Product {
            title: String,
            price: f64,
        }

        let cache = cache(MockClock::new());
        let product = Product { title: "Cable".into(), price: 9.99 };
        cache.set_serialized("product:d.com:1", &product, None).unwrap();
        assert_eq!(cache.get_as::<Product>("product:d.com:1").unwrap(), Some(product));
        assert_eq!(cache.get_as::<Product>("product:d.com:missing").unwrap(), None);

        cache.set("product:d.com:bad", json!("not a product"), None);
        assert!(cache.get_as::<Product>("product:d.com:bad").is_err());
    }

    #[tokio::test]
    async fn test_persist_and_rehydrate_skip_expired() {
        let clock = MockClock::new();
        let backend = Arc::new(MemoryBackend::default());
        let cache = cache(clock.clone()).with_backend(backend.clone());
        cache.set("ns:d.com:short", json!(1), Some(Duration::from_secs(1)));
        cache.set("ns:d.com:long", json!(2), Some(Duration::from_secs(60)));

        assert_eq!(cache.persist().await.unwrap(), 2);

        clock.advance(Duration::from_secs(5));
        let restored = ScrapeCache::with_clock(CacheSettings::default(), clock).with_backend(backend);
        assert_eq!(restored.rehydrate().await.unwrap(), 1);
        assert_eq!(restored.get("ns:d.com:long"), Some(json!(2)));
    }

    #[test]
    fn test_create_key_counts_hashes() {
        let metrics = Arc::new(InMemoryMetricsCollector::new());
        let cache = cache(MockClock::new()).with_metrics(metrics.clone());
        cache.create_key("search", &"q".repeat(150));
        cache.create_key("search", "short");
        assert_eq!(cache.stats().hashed_keys, 1);
        assert_eq!(metrics.counter_total(names::CACHE_KEYS_HASHED_TOTAL), 1);
    }
}
