//! File-backed implementations of the proxy store and cache backend ports

mod json_file;
pub mod json_cache_backend;
pub mod json_proxy_store;

pub use json_cache_backend::JsonCacheBackend;
pub use json_proxy_store::JsonProxyStore;
