//! Static retry/recovery behaviour per error kind

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ErrorKind;

/// How the orchestrator reacts to one kind of failure.
///
/// Every field has a default so overrides in configuration only need to name
/// what they change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
    pub rotate_proxy: bool,
    pub recreate_session: bool,
    pub enhance_stealth: bool,
    pub solve_captcha: bool,
    pub disable_proxy: bool,
    pub requires_auth: bool,
    pub reduce_resource_usage: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 1000,
            backoff_factor: 2.0,
            rotate_proxy: false,
            recreate_session: false,
            enhance_stealth: false,
            solve_captcha: false,
            disable_proxy: false,
            requires_auth: false,
            reduce_resource_usage: false,
        }
    }
}

impl RetryPolicy {
    /// Base delay as a `Duration`.
    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Un-jittered delay before retry number `retry_count` (1-based):
    /// `base_delay · backoff_factor^(retry_count − 1)`.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let exponent = i32::try_from(retry_count.saturating_sub(1)).unwrap_or(i32::MAX);
        let millis = self.base_delay_ms as f64 * self.backoff_factor.max(0.0).powi(exponent);
        Duration::try_from_secs_f64((millis / 1000.0).max(0.0)).unwrap_or(Duration::MAX)
    }

    /// Built-in policy for `kind`.
    pub fn builtin(kind: ErrorKind) -> Self {
        let d = Self::default();
        match kind {
            ErrorKind::Network => {
                Self { max_retries: 3, base_delay_ms: 2000, rotate_proxy: true, ..d }
            }
            ErrorKind::ConnectionReset => {
                Self { max_retries: 3, base_delay_ms: 1000, rotate_proxy: true, ..d }
            }
            ErrorKind::DnsLookup => Self { max_retries: 2, base_delay_ms: 5000, ..d },
            ErrorKind::Timeout => Self {
                max_retries: 3,
                base_delay_ms: 3000,
                backoff_factor: 1.5,
                rotate_proxy: true,
                ..d
            },
            ErrorKind::Http400 => d,
            ErrorKind::Http401 => Self {
                max_retries: 1,
                base_delay_ms: 2000,
                backoff_factor: 1.0,
                recreate_session: true,
                requires_auth: true,
                ..d
            },
            ErrorKind::Http403 => Self {
                max_retries: 3,
                base_delay_ms: 5000,
                rotate_proxy: true,
                recreate_session: true,
                enhance_stealth: true,
                ..d
            },
            ErrorKind::Http404 => Self { max_retries: 1, backoff_factor: 1.0, ..d },
            ErrorKind::Http429 => {
                Self { max_retries: 5, base_delay_ms: 5000, rotate_proxy: true, ..d }
            }
            ErrorKind::Http500 => Self { max_retries: 3, base_delay_ms: 3000, ..d },
            ErrorKind::Http503 => {
                Self { max_retries: 4, base_delay_ms: 5000, rotate_proxy: true, ..d }
            }
            ErrorKind::ContentEmpty => Self {
                max_retries: 2,
                base_delay_ms: 2000,
                backoff_factor: 1.5,
                rotate_proxy: true,
                ..d
            },
            ErrorKind::ContentInvalid => {
                Self { max_retries: 2, base_delay_ms: 2000, backoff_factor: 1.5, ..d }
            }
            ErrorKind::ParseError => Self { max_retries: 1, backoff_factor: 1.0, ..d },
            ErrorKind::Captcha => Self {
                max_retries: 3,
                base_delay_ms: 5000,
                backoff_factor: 1.5,
                rotate_proxy: true,
                solve_captcha: true,
                enhance_stealth: true,
                ..d
            },
            ErrorKind::BotDetection => Self {
                max_retries: 3,
                base_delay_ms: 10_000,
                rotate_proxy: true,
                recreate_session: true,
                enhance_stealth: true,
                ..d
            },
            ErrorKind::FingerprintDetected => Self {
                max_retries: 3,
                base_delay_ms: 8000,
                rotate_proxy: true,
                recreate_session: true,
                enhance_stealth: true,
                ..d
            },
            ErrorKind::BrowserVerification => Self {
                max_retries: 3,
                base_delay_ms: 8000,
                backoff_factor: 1.5,
                recreate_session: true,
                enhance_stealth: true,
                solve_captcha: true,
                ..d
            },
            ErrorKind::AuthRequired => Self { requires_auth: true, ..d },
            ErrorKind::SessionExpired => {
                Self { max_retries: 2, backoff_factor: 1.0, recreate_session: true, ..d }
            }
            ErrorKind::ProxyError => {
                Self { max_retries: 3, backoff_factor: 1.5, rotate_proxy: true, ..d }
            }
            ErrorKind::ProxyBanned => Self {
                max_retries: 3,
                backoff_factor: 1.0,
                rotate_proxy: true,
                disable_proxy: true,
                ..d
            },
            ErrorKind::ResourceLimit => Self {
                max_retries: 2,
                base_delay_ms: 10_000,
                reduce_resource_usage: true,
                ..d
            },
            ErrorKind::CircuitOpen => d,
            ErrorKind::Unknown => Self { max_retries: 2, base_delay_ms: 2000, ..d },
        }
    }
}

/// The policy table consulted by the classifier.
///
/// Built from the built-in table plus configuration overrides; immutable
/// once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicies {
    table: HashMap<ErrorKind, RetryPolicy>,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self::with_overrides(&HashMap::new())
    }
}

impl RetryPolicies {
    /// Built-in table with `overrides` replacing individual entries.
    pub fn with_overrides(overrides: &HashMap<ErrorKind, RetryPolicy>) -> Self {
        let table = ErrorKind::ALL
            .iter()
            .map(|kind| (*kind, overrides.get(kind).copied().unwrap_or(RetryPolicy::builtin(*kind))))
            .collect();
        Self { table }
    }

    /// Policy for `kind`, falling back to the `Unknown` policy.
    pub fn get(&self, kind: ErrorKind) -> RetryPolicy {
        self.table
            .get(&kind)
            .or_else(|| self.table.get(&ErrorKind::Unknown))
            .copied()
            .unwrap_or_else(|| RetryPolicy::builtin(ErrorKind::Unknown))
    }
}
