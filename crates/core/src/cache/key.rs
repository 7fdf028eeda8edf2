//! Cache key construction
//!
//! Keys render as `namespace:domain:identifier`. The domain segment comes
//! from the identifier when it parses as a URL; the identifier segment is
//! sanitized to `[A-Za-z0-9._-]`, or replaced by a SHA-256 digest when it is
//! too long to keep readable.

use std::sync::atomic::{AtomicU64, Ordering};

use scrapeshield_domain::constants::{
    DEFAULT_CACHE_DOMAIN, HASHED_IDENTIFIER_HEX_LEN, HASHED_IDENTIFIER_PREFIX,
    MAX_IDENTIFIER_LENGTH,
};
use sha2::{Digest, Sha256};

use crate::net::domain_from_url;

/// Separator between key segments.
pub const KEY_SEPARATOR: char = ':';

/// Builds cache keys and counts how many identifiers had to be hashed.
#[derive(Debug, Default)]
pub struct CacheKeyBuilder {
    hashed: AtomicU64,
}

impl CacheKeyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key for `identifier` under `namespace`.
    ///
    /// The same inputs always produce the same key.
    pub fn create_key(&self, namespace: &str, identifier: &str) -> String {
        let domain = domain_from_url(identifier).unwrap_or_else(|| DEFAULT_CACHE_DOMAIN.to_string());
        let namespace = match sanitize(namespace) {
            ns if ns.is_empty() => "cache".to_string(),
            ns => ns,
        };

        let sanitized = sanitize(identifier);
        let segment = if identifier.chars().count() > MAX_IDENTIFIER_LENGTH || sanitized.is_empty()
        {
            self.hashed.fetch_add(1, Ordering::Relaxed);
            hash_identifier(identifier)
        } else {
            sanitized
        };

        format!("{namespace}{KEY_SEPARATOR}{domain}{KEY_SEPARATOR}{segment}")
    }

    /// Identifiers that were hashed so far.
    pub fn hashed_count(&self) -> u64 {
        self.hashed.load(Ordering::Relaxed)
    }
}

/// Domain segment of a key built by [`CacheKeyBuilder::create_key`].
///
/// Foreign keys without a domain segment fall into the default domain.
pub fn domain_of_key(key: &str) -> &str {
    let mut segments = key.splitn(3, KEY_SEPARATOR);
    match (segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(domain), Some(_)) if !domain.is_empty() => domain,
        _ => DEFAULT_CACHE_DOMAIN,
    }
}

fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.trim().chars() {
        let keep = ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_');
        let ch = if keep { ch } else { '_' };
        if ch == '_' && out.ends_with('_') {
            continue;
        }
        out.push(ch);
    }
    out.trim_matches('_').to_string()
}

fn hash_identifier(identifier: &str) -> String {
    let digest = hex::encode(Sha256::digest(identifier.as_bytes()));
    format!("{HASHED_IDENTIFIER_PREFIX}{}", &digest[..HASHED_IDENTIFIER_HEX_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_identifiers_carry_their_domain() {
        let keys = CacheKeyBuilder::new();
        let key = keys.create_key("product", "https://www.amazon.com/dp/B01N5IB20Q?th=1");
        assert_eq!(key, "product:amazon.com:https_www.amazon.com_dp_B01N5IB20Q_th_1");
        assert_eq!(domain_of_key(&key), "amazon.com");
    }

    #[test]
    fn plain_identifiers_use_default_domain() {
        let keys = CacheKeyBuilder::new();
        let key = keys.create_key("search", "  usb c cable / 2m ");
        assert_eq!(key, "search:default:usb_c_cable_2m");
        assert_eq!(domain_of_key(&key), "default");
        assert_eq!(keys.hashed_count(), 0);
    }

    #[test]
    fn long_identifiers_are_hashed_stably() {
        let keys = CacheKeyBuilder::new();
        let long = format!("https://www.walmart.com/search?q={}", "x".repeat(200));
        let first = keys.create_key("search", &long);
        let second = keys.create_key("search", &long);

        assert_eq!(first, second);
        let segment = first.rsplit(':').next().unwrap();
        assert!(segment.starts_with("h_"));
        assert_eq!(segment.len(), 2 + 32);
        assert_eq!(domain_of_key(&first), "walmart.com");
        assert_eq!(keys.hashed_count(), 2);
    }

    #[test]
    fn identifiers_with_nothing_to_keep_are_hashed() {
        let keys = CacheKeyBuilder::new();
        let key = keys.create_key("product", "✓✓✓");
        assert!(key.starts_with("product:default:h_"));
    }

    #[test]
    fn foreign_keys_fall_back_to_default_domain() {
        assert_eq!(domain_of_key("bare"), "default");
        assert_eq!(domain_of_key("a::b"), "default");
    }
}
