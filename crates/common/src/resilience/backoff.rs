//! Bounded, jittered backoff delays

use std::time::Duration;

use rand::Rng;
use thiserror::Error;

/// Backoff configuration rejected at construction time
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackoffError {
    #[error("jitter factor must be within [0, 1], got {0}")]
    InvalidJitter(f64),
}

/// Caps and randomizes raw retry delays.
///
/// The raw delay comes from the caller (usually a per-error-kind policy);
/// `Backoff` only bounds it and spreads it by `±jitter_factor` so that
/// concurrent retries against the same site do not line up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    max_delay: Duration,
    jitter_factor: f64,
}

impl Backoff {
    pub fn new(max_delay: Duration, jitter_factor: f64) -> Result<Self, BackoffError> {
        if !(0.0..=1.0).contains(&jitter_factor) {
            return Err(BackoffError::InvalidJitter(jitter_factor));
        }
        Ok(Self { max_delay, jitter_factor })
    }

    /// Backoff without randomization.
    pub const fn deterministic(max_delay: Duration) -> Self {
        Self { max_delay, jitter_factor: 0.0 }
    }

    pub const fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub const fn jitter_factor(&self) -> f64 {
        self.jitter_factor
    }

    /// `base · factor^(attempt − 1)` for a 1-based attempt number.
    pub fn exponential(base: Duration, factor: f64, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = base.as_secs_f64() * factor.max(0.0).powi(exponent);
        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
    }

    /// Applies jitter, then the cap.
    pub fn apply(&self, raw: Duration) -> Duration {
        self.jittered(raw).min(self.max_delay)
    }

    fn jittered(&self, raw: Duration) -> Duration {
        if self.jitter_factor <= 0.0 || raw.is_zero() {
            return raw;
        }
        let spread = rand::thread_rng().gen_range(-self.jitter_factor..=self.jitter_factor);
        Duration::try_from_secs_f64((raw.as_secs_f64() * (1.0 + spread)).max(0.0))
            .unwrap_or(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth() {
        let base = Duration::from_millis(100);
        assert_eq!(Backoff::exponential(base, 2.0, 1), Duration::from_millis(100));
        assert_eq!(Backoff::exponential(base, 2.0, 3), Duration::from_millis(400));
        assert_eq!(Backoff::exponential(base, 1.0, 5), Duration::from_millis(100));
    }

    #[test]
    fn test_cap_applies_after_jitter() {
        let backoff = Backoff::new(Duration::from_secs(1), 0.5).unwrap();
        for _ in 0..50 {
            assert!(backoff.apply(Duration::from_secs(10)) <= Duration::from_secs(1));
        }
    }

    #[test]
    fn test_jitter_stays_within_band() {
        let backoff = Backoff::new(Duration::from_secs(60), 0.1).unwrap();
        for _ in 0..200 {
            let delay = backoff.apply(Duration::from_millis(1000));
            assert!(delay >= Duration::from_millis(900), "{delay:?}");
            assert!(delay <= Duration::from_millis(1100), "{delay:?}");
        }
    }

    #[test]
    fn test_deterministic_is_identity_below_cap() {
        let backoff = Backoff::deterministic(Duration::from_secs(60));
        assert_eq!(backoff.apply(Duration::from_millis(1234)), Duration::from_millis(1234));
    }

    #[test]
    fn test_invalid_jitter_rejected() {
        assert_eq!(
            Backoff::new(Duration::from_secs(1), 1.5),
            Err(BackoffError::InvalidJitter(1.5))
        );
    }
}
