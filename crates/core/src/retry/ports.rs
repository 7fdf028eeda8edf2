//! Captcha solving capability consumed by the orchestrator

use async_trait::async_trait;
use scrapeshield_domain::ErrorKind;
use thiserror::Error;

/// What a solver needs to know about the challenge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptchaParams {
    pub page_url: String,
    pub site_key: Option<String>,
    /// Provider-specific challenge type, e.g. `recaptcha_v2`.
    pub captcha_type: Option<String>,
}

impl CaptchaParams {
    pub fn new(page_url: impl Into<String>) -> Self {
        Self { page_url: page_url.into(), ..Self::default() }
    }

    pub fn with_site_key(mut self, site_key: impl Into<String>) -> Self {
        self.site_key = Some(site_key.into());
        self
    }

    pub fn with_type(mut self, captcha_type: impl Into<String>) -> Self {
        self.captcha_type = Some(captcha_type.into());
        self
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptchaError {
    #[error("captcha solver unavailable: {0}")]
    Unavailable(String),

    #[error("captcha rejected: {0}")]
    Rejected(String),

    #[error("captcha solver timed out")]
    Timeout,
}

/// External captcha solving service
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    /// Solve the challenge behind a `kind` failure
    ///
    /// `Ok(None)` means the solver declined; the retry proceeds without a
    /// token either way.
    async fn solve(
        &self,
        kind: ErrorKind,
        params: &CaptchaParams,
    ) -> Result<Option<String>, CaptchaError>;
}
