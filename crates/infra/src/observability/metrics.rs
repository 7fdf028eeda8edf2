//! Prometheus-backed metrics sink
//!
//! Metric families are registered lazily: the first call for a name fixes
//! its label names, and later calls with a different label set are dropped
//! with a warning. Everything lives in a private [`Registry`], so several
//! service sets can run side by side in one process.

use std::fmt;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use prometheus::core::Collector;
use prometheus::{CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use scrapeshield_common::observability::names;
use scrapeshield_common::MetricsCollector;
use scrapeshield_domain::{Result, ScrapeShieldError};
use tracing::warn;

use crate::errors::InfraError;

/// Bucket bounds for `*_ms` histograms.
const MILLISECOND_BUCKETS: [f64; 12] =
    [10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10_000.0, 30_000.0, 60_000.0, 300_000.0];

struct Family<V> {
    vec: V,
    label_names: Vec<String>,
}

/// [`MetricsCollector`] exporting through the `prometheus` crate.
#[derive(Default)]
pub struct PrometheusMetrics {
    registry: Registry,
    counters: DashMap<String, Family<CounterVec>>,
    gauges: DashMap<String, Family<GaugeVec>>,
    histograms: DashMap<String, Family<HistogramVec>>,
}

impl fmt::Debug for PrometheusMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrometheusMetrics")
            .field("counters", &self.counters.len())
            .field("gauges", &self.gauges.len())
            .field("histograms", &self.histograms.len())
            .finish()
    }
}

impl PrometheusMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every family created so far.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Current values in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String> {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer).map_err(InfraError::from)?;
        String::from_utf8(buffer)
            .map_err(|e| ScrapeShieldError::Internal(format!("metrics output is not UTF-8: {e}")))
    }

    fn family<V>(
        &self,
        map: &DashMap<String, Family<V>>,
        name: &str,
        labels: &[(&str, &str)],
        build: impl FnOnce(&[&str]) -> prometheus::Result<V>,
    ) -> Option<V>
    where
        V: Collector + Clone + 'static,
    {
        let family = match map.entry(name.to_string()) {
            Entry::Occupied(occupied) => occupied.into_ref(),
            Entry::Vacant(vacant) => {
                let label_names: Vec<&str> = labels.iter().map(|(key, _)| *key).collect();
                let created = build(&label_names).and_then(|vec| {
                    self.registry.register(Box::new(vec.clone()))?;
                    Ok(vec)
                });
                match created {
                    Ok(vec) => vacant.insert(Family {
                        vec,
                        label_names: label_names.iter().map(|s| (*s).to_string()).collect(),
                    }),
                    Err(err) => {
                        warn!(metric = name, error = %err, "Failed to register metric");
                        return None;
                    }
                }
            }
        };

        let same_labels = family.label_names.len() == labels.len()
            && family.label_names.iter().zip(labels).all(|(known, (key, _))| known == key);
        if !same_labels {
            warn!(metric = name, expected = ?family.label_names, "Dropping sample with mismatched labels");
            return None;
        }
        Some(family.vec.clone())
    }
}

impl MetricsCollector for PrometheusMetrics {
    fn increment_counter(&self, name: &str, labels: &[(&str, &str)]) {
        let Some(vec) = self.family(&self.counters, name, labels, |label_names| {
            CounterVec::new(Opts::new(name, help_for(name)), label_names)
        }) else {
            return;
        };
        if let Ok(counter) = vec.get_metric_with_label_values(&label_values(labels)) {
            counter.inc();
        }
    }

    fn record_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        let Some(vec) = self.family(&self.gauges, name, labels, |label_names| {
            GaugeVec::new(Opts::new(name, help_for(name)), label_names)
        }) else {
            return;
        };
        if let Ok(gauge) = vec.get_metric_with_label_values(&label_values(labels)) {
            gauge.set(value);
        }
    }

    fn record_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        let Some(vec) = self.family(&self.histograms, name, labels, |label_names| {
            let mut opts = HistogramOpts::new(name, help_for(name));
            if name.ends_with("_ms") {
                opts = opts.buckets(MILLISECOND_BUCKETS.to_vec());
            }
            HistogramVec::new(opts, label_names)
        }) else {
            return;
        };
        if let Ok(histogram) = vec.get_metric_with_label_values(&label_values(labels)) {
            histogram.observe(value);
        }
    }
}

fn label_values<'a>(labels: &[(&str, &'a str)]) -> Vec<&'a str> {
    labels.iter().map(|(_, value)| *value).collect()
}

fn help_for(name: &str) -> &'static str {
    match name {
        names::ERRORS_TOTAL => "Classified scrape failures by kind and domain",
        names::RETRY_ATTEMPTS_TOTAL => "Failed attempts that were retried, by error kind",
        names::RETRY_OUTCOMES_TOTAL => "Finished retry loops by outcome",
        names::RETRY_DELAY_MS => "Backoff delay before each retry in milliseconds",
        names::CIRCUIT_TRANSITIONS_TOTAL => "Circuit breaker state transitions",
        names::CIRCUIT_REJECTIONS_TOTAL => "Requests refused by an open circuit",
        names::PROXY_POOL_SIZE => "Proxies per pool set",
        names::PROXY_BANS_TOTAL => "Proxies banned",
        names::CACHE_REQUESTS_TOTAL => "Cache lookups by result",
        names::CACHE_HIT_RATE => "Fraction of cache lookups served from the cache",
        names::CACHE_EVICTIONS_TOTAL => "Cache entries evicted for capacity, by domain",
        names::CACHE_KEYS_HASHED_TOTAL => "Cache keys whose identifier was hashed",
        _ => "ScrapeShield metric",
    }
}
