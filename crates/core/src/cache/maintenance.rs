//! Background cache maintenance

use std::sync::Arc;

use async_trait::async_trait;
use scrapeshield_common::{Clock, JobError, PeriodicJob};

use super::store::ScrapeCache;

/// Periodic capacity sweep.
pub struct CacheSweepJob<C: Clock> {
    cache: Arc<ScrapeCache<C>>,
}

impl<C: Clock> CacheSweepJob<C> {
    pub fn new(cache: Arc<ScrapeCache<C>>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl<C: Clock> PeriodicJob for CacheSweepJob<C> {
    async fn run(&self) -> Result<(), JobError> {
        self.cache.enforce_capacity();
        Ok(())
    }
}

/// Periodic removal of expired entries.
pub struct CachePurgeJob<C: Clock> {
    cache: Arc<ScrapeCache<C>>,
}

impl<C: Clock> CachePurgeJob<C> {
    pub fn new(cache: Arc<ScrapeCache<C>>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl<C: Clock> PeriodicJob for CachePurgeJob<C> {
    async fn run(&self) -> Result<(), JobError> {
        self.cache.purge_expired();
        Ok(())
    }
}
