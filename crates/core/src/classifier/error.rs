//! Raw and classified failure types

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use scrapeshield_domain::{ErrorKind, RetryPolicy};
use thiserror::Error;

use super::context::ErrorContext;

/// A single failed attempt, as reported by the scrape operation.
///
/// Operations fill in whatever they know: a low-level fault code
/// (`ECONNRESET`, `net::ERR_PROXY_CONNECTION_FAILED`), a pre-tagged kind, or
/// the HTTP response in [`ErrorContext`]. The classifier takes it from there.
#[derive(Debug, Clone)]
pub struct ScrapeError {
    pub message: String,
    pub code: Option<String>,
    pub kind: Option<ErrorKind>,
    pub timed_out: bool,
    pub context: ErrorContext,
    source: Option<Arc<dyn StdError + Send + Sync>>,
}

impl ScrapeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            kind: None,
            timed_out: false,
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Failure carrying an HTTP response.
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::new(format!("HTTP {status}"))
            .with_context(ErrorContext::new().with_status(status).with_body(body))
    }

    /// Failure carrying a transport fault code.
    pub fn network(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(message).with_code(code)
    }

    /// Attempt that ran out of time.
    pub fn timeout(message: impl Into<String>) -> Self {
        let mut err = Self::new(message);
        err.timed_out = true;
        err
    }

    /// Failure whose kind the caller already knows.
    pub fn tagged(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(message).with_kind(kind)
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }
}

impl fmt::Display for ScrapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl StdError for ScrapeError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_deref().map(|err| err as &(dyn StdError + 'static))
    }
}

/// A failure after classification: what happened and what to do about it.
#[derive(Debug, Clone, Error)]
#[error("{kind} after {attempts} attempt(s): {original}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    #[source]
    pub original: ScrapeError,
    pub policy: RetryPolicy,
    pub context: ErrorContext,
    pub classified_at: DateTime<Utc>,
    /// Operation attempts made before this error surfaced.
    pub attempts: u32,
}

impl ClassifiedError {
    pub fn is_retryable(&self) -> bool {
        self.policy.max_retries > 0
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}
