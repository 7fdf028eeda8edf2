//! Optional persistence behind the cache

use async_trait::async_trait;
use scrapeshield_domain::{CacheEntry, Result};

/// Durable mirror of cache entries
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn load(&self) -> Result<Vec<CacheEntry>>;

    /// Replace the stored entries
    async fn save(&self, entries: &[CacheEntry]) -> Result<()>;
}
