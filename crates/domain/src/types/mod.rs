//! Domain types and models

pub mod cache;
pub mod circuit;
pub mod error_kind;
pub mod proxy;
pub mod retry_policy;

pub use cache::CacheEntry;
pub use circuit::{CircuitSnapshot, CircuitState};
pub use error_kind::ErrorKind;
pub use proxy::{PoolSet, PoolSizes, Proxy, ProxyRecord, ProxyStats, ProxyType, SelectionStrategy};
pub use retry_policy::{RetryPolicies, RetryPolicy};
