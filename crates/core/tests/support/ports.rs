//! Mock port implementations for testing
//!
//! Each mock records what it was asked so tests can assert on the calls.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use scrapeshield_core::{CacheBackend, ProbeResult, ProxyProbe, ProxyStore};
use scrapeshield_domain::{CacheEntry, Proxy, ProxyRecord, Result as DomainResult, ScrapeShieldError};

/// In-memory `ProxyStore`.
#[derive(Default)]
pub struct MemoryProxyStore {
    records: Mutex<Vec<ProxyRecord>>,
    saves: AtomicUsize,
    fail_saves: Mutex<bool>,
}

impl MemoryProxyStore {
    pub fn new(records: Vec<ProxyRecord>) -> Self {
        Self { records: Mutex::new(records), ..Self::default() }
    }

    pub fn records(&self) -> Vec<ProxyRecord> {
        self.records.lock().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn fail_saves(&self, fail: bool) {
        *self.fail_saves.lock() = fail;
    }
}

#[async_trait]
impl ProxyStore for MemoryProxyStore {
    async fn load(&self) -> DomainResult<Vec<ProxyRecord>> {
        Ok(self.records.lock().clone())
    }

    async fn save(&self, records: &[ProxyRecord]) -> DomainResult<()> {
        if *self.fail_saves.lock() {
            return Err(ScrapeShieldError::Persistence("disk full".into()));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.records.lock() = records.to_vec();
        Ok(())
    }
}

/// `ProxyProbe` that fails for a configurable set of proxy ids.
#[derive(Default)]
pub struct ScriptedProbe {
    failing: Mutex<HashSet<String>>,
    probed: Mutex<Vec<String>>,
}

impl ScriptedProbe {
    pub fn fail(&self, id: &str) {
        self.failing.lock().insert(id.to_string());
    }

    pub fn heal(&self, id: &str) {
        self.failing.lock().remove(id);
    }

    pub fn probed(&self) -> Vec<String> {
        self.probed.lock().clone()
    }
}

#[async_trait]
impl ProxyProbe for ScriptedProbe {
    async fn probe(&self, proxy: &Proxy, _test_url: &str, _timeout: Duration) -> ProbeResult {
        self.probed.lock().push(proxy.id.clone());
        if self.failing.lock().contains(&proxy.id) {
            ProbeResult::failure("connection refused")
        } else {
            ProbeResult::success(Duration::from_millis(250))
        }
    }
}

/// In-memory `CacheBackend`.
#[derive(Default)]
pub struct MemoryCacheBackend {
    entries: Mutex<Vec<CacheEntry>>,
}

impl MemoryCacheBackend {
    pub fn entries(&self) -> Vec<CacheEntry> {
        self.entries.lock().clone()
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn load(&self) -> DomainResult<Vec<CacheEntry>> {
        Ok(self.entries.lock().clone())
    }

    async fn save(&self, entries: &[CacheEntry]) -> DomainResult<()> {
        *self.entries.lock() = entries.to_vec();
        Ok(())
    }
}
