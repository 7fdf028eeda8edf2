//! Scrape result cache with TTL expiry and per-domain capacity

pub mod key;
mod maintenance;
pub mod ports;
mod store;

pub use key::{domain_of_key, CacheKeyBuilder};
pub use maintenance::{CachePurgeJob, CacheSweepJob};
pub use ports::CacheBackend;
pub use store::{CacheStats, ScrapeCache};
