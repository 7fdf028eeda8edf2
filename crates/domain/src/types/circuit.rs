//! Circuit breaker state as seen from outside the breaker

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-domain circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Requests are rejected until the cool-down elapses.
    Open,
    /// A single probe request is in flight.
    HalfOpen,
}

crate::impl_label_conversions!(CircuitState {
    Closed => "CLOSED",
    Open => "OPEN",
    HalfOpen => "HALF_OPEN",
});

/// Observability view of one domain's breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitSnapshot {
    pub domain: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub opened_at: Option<DateTime<Utc>>,
}
