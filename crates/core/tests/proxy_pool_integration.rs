//! Proxy pool lifecycle against in-memory store and probe implementations.

mod support;

use std::sync::Arc;
use std::time::Duration;

use scrapeshield_common::{InMemoryMetricsCollector, MockClock};
use scrapeshield_core::{ProxyManager, ProxyRequest};
use scrapeshield_domain::{
    ErrorKind, PoolSet, PoolSizes, Proxy, ProxyPoolSettings, ProxyRecord, SelectionStrategy,
};
use support::ports::{MemoryProxyStore, ScriptedProbe};
use tokio_util::sync::CancellationToken;

fn settings(strategy: SelectionStrategy) -> ProxyPoolSettings {
    ProxyPoolSettings { strategy, ..ProxyPoolSettings::default() }
}

fn stored_records() -> Vec<ProxyRecord> {
    let mut backup = ProxyRecord::new(Proxy::new("spare", "http://spare:3128"));
    backup.backup = true;
    let mut disabled = ProxyRecord::new(Proxy::new("off", "http://off:3128"));
    disabled.proxy.enabled = false;
    vec![
        ProxyRecord::new(Proxy::new("a", "http://a:3128").with_country("US")),
        ProxyRecord::new(Proxy::new("", "http://anon:3128")),
        backup,
        disabled,
    ]
}

/// Validates `ProxyManager::load` and `ProxyManager::flush` behavior for a
/// stored pool.
///
/// Assertions:
/// - Confirms records land in the set their flags describe.
/// - Confirms records without an id get one and the pool is flushed.
/// - Confirms a clean pool is not written again.
#[tokio::test]
async fn test_load_places_records_and_flushes_generated_ids() {
    let store = Arc::new(MemoryProxyStore::new(stored_records()));
    let manager =
        ProxyManager::with_clock(settings(SelectionStrategy::Performance), MockClock::new())
            .with_store(store.clone());

    assert_eq!(manager.load().await.unwrap(), 4);
    assert_eq!(manager.pool_sizes(), PoolSizes { active: 2, disabled: 1, backup: 1 });
    assert!(manager.is_dirty());

    assert!(manager.flush().await.unwrap());
    assert!(!manager.flush().await.unwrap());
    assert_eq!(store.save_count(), 1);

    let saved = store.records();
    assert_eq!(saved.len(), 4);
    assert!(saved.iter().all(|record| !record.proxy.id.is_empty()));
    assert_eq!(saved[2].set, Some(PoolSet::Backup));
}

#[tokio::test]
async fn test_failed_flush_keeps_pool_dirty() {
    let store = Arc::new(MemoryProxyStore::default());
    let manager = ProxyManager::with_clock(settings(SelectionStrategy::Random), MockClock::new())
        .with_store(store.clone());
    manager.add_proxy(Proxy::new("a", "http://a:1"), PoolSet::Active);

    store.fail_saves(true);
    assert!(manager.flush().await.is_err());
    assert!(manager.is_dirty());

    store.fail_saves(false);
    assert!(manager.flush().await.unwrap());
    assert_eq!(store.records().len(), 1);
}

/// Validates the ban lifecycle end to end.
///
/// Assertions:
/// - Confirms a banned proxy is never selected while disabled.
/// - Confirms a passing health check before the minimum ban does nothing.
/// - Confirms the proxy returns once the ban has elapsed and a probe passes.
#[tokio::test]
async fn test_banned_proxy_returns_only_after_ban_and_health_check() {
    let clock = MockClock::new();
    let manager = ProxyManager::with_clock(settings(SelectionStrategy::Random), clock.clone());
    for (proxy, set) in support::us_proxies(3) {
        manager.add_proxy(proxy, set);
    }
    let probe = ScriptedProbe::default();

    assert!(manager.mark_proxy_banned("p1"));
    for _ in 0..50 {
        let pick = manager.get_proxy("https://www.bestbuy.com/site/1", &ProxyRequest::new()).unwrap();
        assert_ne!(pick.id, "p1");
    }

    clock.advance(Duration::from_secs(10 * 60));
    manager.run_health_checks(&probe).await;
    assert_eq!(manager.proxy_set("p1"), Some(PoolSet::Disabled));

    clock.advance(Duration::from_secs(25 * 60));
    let report = manager.run_health_checks(&probe).await;
    assert_eq!(report.promoted, 1);
    assert_eq!(manager.proxy_set("p1"), Some(PoolSet::Active));
}

#[tokio::test]
async fn test_failing_disabled_proxy_restarts_its_ban() {
    let clock = MockClock::new();
    let manager = ProxyManager::with_clock(settings(SelectionStrategy::Random), clock.clone());
    manager.add_proxy(Proxy::new("flaky", "http://flaky:1"), PoolSet::Active);
    manager.record_failure("flaky", Some(ErrorKind::ProxyBanned));

    let probe = ScriptedProbe::default();
    probe.fail("flaky");
    clock.advance(Duration::from_secs(31 * 60));
    manager.run_health_checks(&probe).await;
    assert_eq!(probe.probed(), vec!["flaky".to_string()]);
    assert_eq!(manager.proxy_set("flaky"), Some(PoolSet::Disabled));

    // ban timer restarted: not eligible again for another full ban
    probe.heal("flaky");
    clock.advance(Duration::from_secs(5 * 60));
    let report = manager.run_health_checks(&probe).await;
    assert_eq!(report.checked, 0);
}

#[tokio::test]
async fn test_pool_size_gauges_follow_structural_changes() {
    let metrics = Arc::new(InMemoryMetricsCollector::new());
    let manager = ProxyManager::with_clock(settings(SelectionStrategy::Random), MockClock::new())
        .with_metrics(metrics.clone());
    for (proxy, set) in support::us_proxies(3) {
        manager.add_proxy(proxy, set);
    }
    manager.record_failure("p0", Some(ErrorKind::ProxyBanned));

    assert_eq!(metrics.gauge("scrape_proxy_pool_size", &[("set", "active")]), Some(2.0));
    assert_eq!(metrics.gauge("scrape_proxy_pool_size", &[("set", "disabled")]), Some(1.0));
    assert_eq!(metrics.counter_total("scrape_proxy_bans_total"), 1);
}

#[test]
fn test_performance_strategy_prefers_high_scores() {
    let manager = ProxyManager::with_clock(settings(SelectionStrategy::Performance), MockClock::new());
    manager.add_proxy(Proxy::new("fast", "http://fast:1"), PoolSet::Active);
    manager.add_proxy(Proxy::new("slow", "http://slow:1"), PoolSet::Active);
    for _ in 0..20 {
        manager.record_failure("slow", None);
        manager.record_success("slow", Duration::from_secs(20));
        manager.record_success("fast", Duration::from_millis(200));
    }

    let fast = (0..200)
        .filter(|_| manager.get_proxy("https://a.com", &ProxyRequest::new()).unwrap().id == "fast")
        .count();
    assert!(fast > 150, "fast proxy picked only {fast} of 200 times");
}

async fn wait_for_saves(store: &MemoryProxyStore, saves: usize) {
    for _ in 0..200 {
        if store.save_count() >= saves {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("expected {saves} saves, saw {}", store.save_count());
}

/// Validates `ProxyManager::flush_on_change` behavior for bans and additions.
///
/// Assertions:
/// - Ensures statistics-only updates do not write the store.
/// - Confirms a ban reaches the store without a periodic flush.
/// - Confirms an added proxy is written the same way.
/// - Confirms the loop exits once cancelled.
#[tokio::test]
async fn test_structural_changes_flush_immediately() {
    let store = Arc::new(MemoryProxyStore::new(vec![ProxyRecord::new(Proxy::new(
        "a",
        "http://a:3128",
    ))]));
    let manager = Arc::new(
        ProxyManager::with_clock(settings(SelectionStrategy::Sequential), MockClock::new())
            .with_store(store.clone()),
    );
    manager.load().await.unwrap();

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn({
        let manager = Arc::clone(&manager);
        let cancel = cancel.clone();
        async move { manager.flush_on_change(cancel).await }
    });

    manager.record_success("a", Duration::from_millis(150));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.save_count(), 0);

    assert!(manager.mark_proxy_banned("a"));
    wait_for_saves(&store, 1).await;
    assert_eq!(store.records()[0].set, Some(PoolSet::Disabled));
    assert_eq!(store.records()[0].stats.ban_count, 1);

    manager.add_proxy(Proxy::new("b", "http://b:3128"), PoolSet::Active);
    wait_for_saves(&store, 2).await;
    assert_eq!(store.records().len(), 2);

    cancel.cancel();
    watcher.await.unwrap();
}
