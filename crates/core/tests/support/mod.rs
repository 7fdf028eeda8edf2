//! Shared test helpers for `scrapeshield-core` integration tests.
//!
//! In-memory implementations of the core ports so scenario tests can focus
//! on behaviour instead of plumbing.

#![allow(dead_code)]

pub mod ports;

use scrapeshield_domain::{PoolSet, Proxy};

/// Active proxies `p0..pN` in the US.
pub fn us_proxies(count: usize) -> Vec<(Proxy, PoolSet)> {
    (0..count)
        .map(|n| {
            let proxy = Proxy::new(format!("p{n}"), format!("http://10.0.0.{n}:8080")).with_country("US");
            (proxy, PoolSet::Active)
        })
        .collect()
}
