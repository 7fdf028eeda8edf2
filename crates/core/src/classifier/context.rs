//! What was known about a request when it failed

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::net::domain_from_url;

/// Request/response facts attached to a failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub status_code: Option<u16>,
    pub url: Option<String>,
    pub response_body: Option<String>,
    /// Response headers; lookups are case-insensitive.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.response_body = Some(body.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Host of `url` without `www.`.
    pub fn domain(&self) -> Option<String> {
        self.url.as_deref().and_then(domain_from_url)
    }

    /// `Retry-After` expressed in whole seconds, if present and numeric.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.header("retry-after").and_then(|value| value.trim().parse::<u64>().ok())
    }
}
