//! Per-domain circuit breaker
//!
//! One state machine per domain, created lazily on the first recorded
//! failure:
//!
//! ```text
//! Closed --threshold failures--> Open --reset_time--> HalfOpen
//!   ^                                                   |  |
//!   +----------------- probe success -------------------+  |
//!                      Open <------- probe failure --------+
//! ```
//!
//! Every decision and transition happens while holding the domain's map
//! entry, so the Open → HalfOpen move and the admission of the single probe
//! are one atomic step: the first caller after the cool-down gets the probe,
//! everyone else keeps seeing Open.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use scrapeshield_common::observability::names;
use scrapeshield_common::{Clock, MetricsCollector, NoOpMetricsCollector, SystemClock};
use scrapeshield_domain::{CircuitBreakerSettings, CircuitSnapshot, CircuitState};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct DomainCircuit {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    opened_at_wall: Option<DateTime<Utc>>,
    probe_started: Option<Instant>,
}

impl DomainCircuit {
    const fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            opened_at_wall: None,
            probe_started: None,
        }
    }
}

/// Circuit breakers for every domain the scraper talks to.
pub struct DomainCircuitBreaker<C: Clock = SystemClock> {
    threshold: u32,
    reset_time: Duration,
    circuits: DashMap<String, DomainCircuit>,
    metrics: Arc<dyn MetricsCollector>,
    clock: C,
}

impl<C: Clock> fmt::Debug for DomainCircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainCircuitBreaker")
            .field("threshold", &self.threshold)
            .field("reset_time", &self.reset_time)
            .field("domains", &self.circuits.len())
            .finish()
    }
}

impl DomainCircuitBreaker<SystemClock> {
    pub fn new(settings: &CircuitBreakerSettings) -> Self {
        Self::with_clock(settings, SystemClock)
    }
}

impl<C: Clock> DomainCircuitBreaker<C> {
    pub fn with_clock(settings: &CircuitBreakerSettings, clock: C) -> Self {
        Self {
            threshold: settings.threshold.max(1),
            reset_time: settings.reset_time,
            circuits: DashMap::new(),
            metrics: Arc::new(NoOpMetricsCollector),
            clock,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Whether an attempt against `domain` may proceed.
    ///
    /// In Open state, the first call after `reset_time` moves the circuit to
    /// HalfOpen and is admitted as the probe. A probe that never reports
    /// back is replaced after another `reset_time`.
    pub fn is_request_allowed(&self, domain: &str) -> bool {
        let Some(mut circuit) = self.circuits.get_mut(domain) else {
            return true;
        };
        let now = self.clock.now();
        let state = circuit.state;

        let allowed = match state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled =
                    circuit.opened_at.map_or(true, |at| now.duration_since(at) >= self.reset_time);
                if cooled {
                    circuit.state = CircuitState::HalfOpen;
                    circuit.probe_started = Some(now);
                    drop(circuit);
                    self.transition(domain, CircuitState::Open, CircuitState::HalfOpen);
                    info!(domain = domain, "Circuit half-open; admitting probe");
                    return true;
                }
                false
            }
            CircuitState::HalfOpen => {
                let stale =
                    circuit.probe_started.map_or(true, |at| now.duration_since(at) >= self.reset_time);
                if stale {
                    circuit.probe_started = Some(now);
                    warn!(domain = domain, "Half-open probe never reported; admitting a new one");
                }
                stale
            }
        };

        if !allowed {
            self.metrics.increment_counter(names::CIRCUIT_REJECTIONS_TOTAL, &[("domain", domain)]);
            debug!(domain = domain, "Circuit rejecting request");
        }
        allowed
    }

    /// Resets the failure counter; closes a half-open circuit.
    ///
    /// Successes arriving while Open come from attempts admitted before the
    /// circuit tripped and do not close it.
    pub fn record_success(&self, domain: &str) {
        let Some(mut circuit) = self.circuits.get_mut(domain) else {
            return;
        };
        let state = circuit.state;
        match state {
            CircuitState::Closed => circuit.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                *circuit = DomainCircuit::closed();
                drop(circuit);
                self.transition(domain, CircuitState::HalfOpen, CircuitState::Closed);
                info!(domain = domain, "Circuit closed after successful probe");
            }
            CircuitState::Open => debug!(domain = domain, "Ignoring success while circuit open"),
        }
    }

    /// Counts a failure, opening the circuit at the threshold or re-opening
    /// it when the half-open probe fails.
    pub fn record_failure(&self, domain: &str) {
        let now = self.clock.now();
        let wall = self.clock.utc_now();
        let mut circuit =
            self.circuits.entry(domain.to_string()).or_insert_with(DomainCircuit::closed);
        circuit.consecutive_failures = circuit.consecutive_failures.saturating_add(1);

        let from = circuit.state;
        let trips = match from {
            CircuitState::Closed => circuit.consecutive_failures >= self.threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };
        if !trips {
            return;
        }

        circuit.state = CircuitState::Open;
        circuit.opened_at = Some(now);
        circuit.opened_at_wall = Some(wall);
        circuit.probe_started = None;
        let failures = circuit.consecutive_failures;
        drop(circuit);

        self.transition(domain, from, CircuitState::Open);
        warn!(
            domain = domain,
            failures = failures,
            reset_ms = self.reset_time.as_millis() as u64,
            "Circuit opened"
        );
    }

    /// Current state; domains never seen are Closed.
    pub fn state(&self, domain: &str) -> CircuitState {
        self.circuits.get(domain).map_or(CircuitState::Closed, |c| c.state)
    }

    pub fn consecutive_failures(&self, domain: &str) -> u32 {
        self.circuits.get(domain).map_or(0, |c| c.consecutive_failures)
    }

    /// All tracked domains, sorted by name.
    pub fn snapshot(&self) -> Vec<CircuitSnapshot> {
        let mut snapshots: Vec<CircuitSnapshot> = self
            .circuits
            .iter()
            .map(|entry| CircuitSnapshot {
                domain: entry.key().clone(),
                state: entry.state,
                consecutive_failures: entry.consecutive_failures,
                opened_at: entry.opened_at_wall,
            })
            .collect();
        snapshots.sort_by(|a, b| a.domain.cmp(&b.domain));
        snapshots
    }

    /// Forgets everything about `domain`.
    pub fn reset(&self, domain: &str) {
        if self.circuits.remove(domain).is_some() {
            info!(domain = domain, "Circuit reset");
        }
    }

    fn transition(&self, domain: &str, from: CircuitState, to: CircuitState) {
        self.metrics.increment_counter(
            names::CIRCUIT_TRANSITIONS_TOTAL,
            &[("domain", domain), ("from", from.as_str()), ("to", to.as_str())],
        );
    }
}
