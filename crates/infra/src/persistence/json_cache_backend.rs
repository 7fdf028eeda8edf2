//! Cache entries mirrored to a JSON file

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use scrapeshield_core::CacheBackend;
use scrapeshield_domain::{CacheEntry, Result};
use tracing::{debug, instrument};

use super::json_file;

/// [`CacheBackend`] writing every live entry to one JSON array.
#[derive(Debug, Clone)]
pub struct JsonCacheBackend {
    path: PathBuf,
}

impl JsonCacheBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CacheBackend for JsonCacheBackend {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn load(&self) -> Result<Vec<CacheEntry>> {
        let entries: Vec<CacheEntry> = json_file::read_list(&self.path).await?;
        debug!(count = entries.len(), "Read cache mirror");
        Ok(entries)
    }

    #[instrument(skip(self, entries), fields(path = %self.path.display(), count = entries.len()))]
    async fn save(&self, entries: &[CacheEntry]) -> Result<()> {
        json_file::write_list(&self.path, entries).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn entry(key: &str, secs: i64) -> CacheEntry {
        CacheEntry {
            key: key.to_string(),
            value: json!({"title": "Widget", "price": 19.99}),
            created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            domain: "shop.example.com".into(),
            ttl_ms: 60_000,
        }
    }

    #[tokio::test]
    async fn save_then_load_returns_entries() {
        let dir = TempDir::new().unwrap();
        let backend = JsonCacheBackend::new(dir.path().join("cache").join("entries.json"));
        let entries = vec![entry("product:shop.example.com:a", 0), entry("product:shop.example.com:b", 5)];

        backend.save(&entries).await.unwrap();
        assert_eq!(backend.load().await.unwrap(), entries);
    }

    #[tokio::test]
    async fn second_save_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let backend = JsonCacheBackend::new(dir.path().join("entries.json"));

        backend.save(&[entry("k:a:1", 0), entry("k:a:2", 1)]).await.unwrap();
        backend.save(&[entry("k:a:3", 2)]).await.unwrap();

        let loaded = backend.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].key, "k:a:3");
    }
}
