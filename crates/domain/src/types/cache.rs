//! Cached scrape results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One cached value with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub domain: String,
    pub ttl_ms: u64,
}

impl CacheEntry {
    /// Instant after which the entry is stale.
    pub fn expires_at(&self) -> DateTime<Utc> {
        let ttl = i64::try_from(self.ttl_ms).unwrap_or(i64::MAX);
        self.created_at
            .checked_add_signed(chrono::Duration::milliseconds(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// True once `now` has passed the expiry instant.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_strictly_after_ttl() {
        let created_at = Utc::now();
        let entry = CacheEntry {
            key: "product:site.com:abc".into(),
            value: serde_json::json!({"price": 10}),
            created_at,
            domain: "site.com".into(),
            ttl_ms: 1000,
        };

        assert!(!entry.is_expired(created_at + chrono::Duration::milliseconds(1000)));
        assert!(entry.is_expired(created_at + chrono::Duration::milliseconds(1001)));
    }
}
