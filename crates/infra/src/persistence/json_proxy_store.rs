//! Proxy list persisted as a JSON array
//!
//! The file holds one object per proxy in pool order: the proxy fields
//! flattened at the top level, followed by `stats`, `set` and `backup`.
//! Hand-written lists may omit everything but `url`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use scrapeshield_core::ProxyStore;
use scrapeshield_domain::{ProxyRecord, Result};
use tracing::{info, instrument};

use super::json_file;

/// [`ProxyStore`] backed by a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonProxyStore {
    path: PathBuf,
}

impl JsonProxyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ProxyStore for JsonProxyStore {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn load(&self) -> Result<Vec<ProxyRecord>> {
        let records: Vec<ProxyRecord> = json_file::read_list(&self.path).await?;
        info!(count = records.len(), "Loaded proxy list");
        Ok(records)
    }

    #[instrument(skip(self, records), fields(path = %self.path.display(), count = records.len()))]
    async fn save(&self, records: &[ProxyRecord]) -> Result<()> {
        json_file::write_list(&self.path, records).await
    }
}

#[cfg(test)]
mod tests {
    use scrapeshield_domain::{PoolSet, Proxy, ProxyType, ScrapeShieldError};
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonProxyStore::new(dir.path().join("proxies.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    /// Validates `JsonProxyStore` behavior for the save-then-load scenario.
    ///
    /// Assertions:
    /// - Confirms records come back in saved order.
    /// - Confirms statistics and set placement survive the trip.
    #[tokio::test]
    async fn save_preserves_order_and_stats() {
        let dir = TempDir::new().unwrap();
        let store = JsonProxyStore::new(dir.path().join("proxies.json"));

        let mut first = ProxyRecord::new(
            Proxy::new("p-us", "http://10.0.0.1:8080").with_country("US").with_tags(["residential"]),
        );
        first.stats.ban_count = 2;
        first.set = Some(PoolSet::Disabled);
        let second = ProxyRecord::new(
            Proxy::new("p-de", "socks5://10.0.0.2:1080").with_type(ProxyType::Socks5),
        );

        store.save(&[first.clone(), second.clone()]).await.unwrap();
        let loaded = store.load().await.unwrap();

        assert_eq!(loaded, vec![first, second]);
    }

    #[tokio::test]
    async fn hand_written_entries_take_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("proxies.json");
        tokio::fs::write(&path, r#"[{"id":"a","url":"http://10.0.0.9:3128","backup":true}]"#)
            .await
            .unwrap();

        let loaded = JsonProxyStore::new(&path).load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].initial_set(), PoolSet::Backup);
        assert_eq!(loaded[0].stats.success_rate, 1.0);
    }

    #[tokio::test]
    async fn corrupt_file_is_persistence_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("proxies.json");
        tokio::fs::write(&path, "[{\"url\":").await.unwrap();

        let err = JsonProxyStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, ScrapeShieldError::Persistence(_)), "{err:?}");
    }
}
