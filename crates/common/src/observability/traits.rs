//! Metrics sink abstraction
//!
//! Services report counters and gauges through [`MetricsCollector`] without
//! depending on a concrete exporter. Production wires in a Prometheus-backed
//! collector from the infrastructure crate; tests use
//! [`InMemoryMetricsCollector`].

use std::fmt::Debug;

use dashmap::DashMap;

/// Sink for counters, gauges and histograms
pub trait MetricsCollector: Send + Sync + Debug {
    /// Increment a counter by one
    fn increment_counter(&self, name: &str, labels: &[(&str, &str)]);

    /// Set a gauge to `value`
    fn record_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]);

    /// Observe a histogram sample
    fn record_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]);

    /// Observe a duration in milliseconds
    fn record_timing(&self, name: &str, duration_ms: u64, labels: &[(&str, &str)]) {
        self.record_histogram(name, duration_ms as f64, labels);
    }
}

/// Collector that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetricsCollector;

impl MetricsCollector for NoOpMetricsCollector {
    fn increment_counter(&self, _name: &str, _labels: &[(&str, &str)]) {}

    fn record_gauge(&self, _name: &str, _value: f64, _labels: &[(&str, &str)]) {}

    fn record_histogram(&self, _name: &str, _value: f64, _labels: &[(&str, &str)]) {}
}

/// Collector that keeps the latest values in memory, keyed by
/// `name{label=value,...}` with labels in call order.
#[derive(Debug, Default)]
pub struct InMemoryMetricsCollector {
    counters: DashMap<String, u64>,
    gauges: DashMap<String, f64>,
    histograms: DashMap<String, Vec<f64>>,
}

impl InMemoryMetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter value, 0 when never incremented.
    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.counters.get(&series_key(name, labels)).map_or(0, |v| *v)
    }

    /// Sum of a counter across every label combination.
    pub fn counter_total(&self, name: &str) -> u64 {
        self.counters
            .iter()
            .filter(|entry| series_name(entry.key()) == name)
            .map(|entry| *entry.value())
            .sum()
    }

    pub fn gauge(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        self.gauges.get(&series_key(name, labels)).map(|v| *v)
    }

    pub fn histogram(&self, name: &str, labels: &[(&str, &str)]) -> Vec<f64> {
        self.histograms.get(&series_key(name, labels)).map(|v| v.clone()).unwrap_or_default()
    }
}

impl MetricsCollector for InMemoryMetricsCollector {
    fn increment_counter(&self, name: &str, labels: &[(&str, &str)]) {
        *self.counters.entry(series_key(name, labels)).or_insert(0) += 1;
    }

    fn record_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        self.gauges.insert(series_key(name, labels), value);
    }

    fn record_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        self.histograms.entry(series_key(name, labels)).or_default().push(value);
    }
}

fn series_key(name: &str, labels: &[(&str, &str)]) -> String {
    if labels.is_empty() {
        return name.to_string();
    }
    let rendered: Vec<String> = labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{name}{{{}}}", rendered.join(","))
}

fn series_name(key: &str) -> &str {
    key.split_once('{').map_or(key, |(name, _)| name)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates `NoOpMetricsCollector` behavior for the discard scenario.
    ///
    /// Assertions:
    /// - Ensures recording through the trait object does not panic.
    #[test]
    fn test_noop_metrics_collector() {
        let collector: &dyn MetricsCollector = &NoOpMetricsCollector;
        collector.increment_counter("scrape_errors_total", &[("kind", "HTTP_429")]);
        collector.record_gauge("proxy_pool_size", 3.0, &[("set", "active")]);
        collector.record_timing("retry_delay_ms", 250, &[]);
    }

    /// Validates `InMemoryMetricsCollector` behavior for the labelled series
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms counters are tracked per label set.
    /// - Confirms `counter_total` sums across label sets.
    /// - Confirms gauges keep the latest value.
    #[test]
    fn test_in_memory_collector_series() {
        let collector = InMemoryMetricsCollector::new();
        collector.increment_counter("errors", &[("kind", "TIMEOUT")]);
        collector.increment_counter("errors", &[("kind", "TIMEOUT")]);
        collector.increment_counter("errors", &[("kind", "HTTP_404")]);
        collector.record_gauge("pool", 4.0, &[]);
        collector.record_gauge("pool", 2.0, &[]);
        collector.record_timing("delay", 100, &[]);

        assert_eq!(collector.counter("errors", &[("kind", "TIMEOUT")]), 2);
        assert_eq!(collector.counter("errors", &[("kind", "CAPTCHA")]), 0);
        assert_eq!(collector.counter_total("errors"), 3);
        assert_eq!(collector.gauge("pool", &[]), Some(2.0));
        assert_eq!(collector.histogram("delay", &[]), vec![100.0]);
    }
}
