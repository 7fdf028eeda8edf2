//! Closed taxonomy of scrape failures

use serde::{Deserialize, Serialize};

/// Every failure the resilience core knows how to react to.
///
/// The set is closed: anything the classifier cannot place lands in
/// [`ErrorKind::Unknown`], whose retry policy is the global fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    // Transport
    Network,
    ConnectionReset,
    DnsLookup,
    Timeout,

    // HTTP status
    #[serde(rename = "HTTP_400")]
    Http400,
    #[serde(rename = "HTTP_401")]
    Http401,
    #[serde(rename = "HTTP_403")]
    Http403,
    #[serde(rename = "HTTP_404")]
    Http404,
    #[serde(rename = "HTTP_429")]
    Http429,
    #[serde(rename = "HTTP_500")]
    Http500,
    #[serde(rename = "HTTP_503")]
    Http503,

    // Content
    ContentEmpty,
    ContentInvalid,
    ParseError,

    // Anti-bot
    Captcha,
    BotDetection,
    FingerprintDetected,
    BrowserVerification,

    // Session
    AuthRequired,
    SessionExpired,

    // Proxy
    ProxyError,
    ProxyBanned,

    // Local
    ResourceLimit,
    CircuitOpen,
    Unknown,
}

crate::impl_label_conversions!(ErrorKind {
    Network => "NETWORK",
    ConnectionReset => "CONNECTION_RESET",
    DnsLookup => "DNS_LOOKUP",
    Timeout => "TIMEOUT",
    Http400 => "HTTP_400",
    Http401 => "HTTP_401",
    Http403 => "HTTP_403",
    Http404 => "HTTP_404",
    Http429 => "HTTP_429",
    Http500 => "HTTP_500",
    Http503 => "HTTP_503",
    ContentEmpty => "CONTENT_EMPTY",
    ContentInvalid => "CONTENT_INVALID",
    ParseError => "PARSE_ERROR",
    Captcha => "CAPTCHA",
    BotDetection => "BOT_DETECTION",
    FingerprintDetected => "FINGERPRINT_DETECTED",
    BrowserVerification => "BROWSER_VERIFICATION",
    AuthRequired => "AUTH_REQUIRED",
    SessionExpired => "SESSION_EXPIRED",
    ProxyError => "PROXY_ERROR",
    ProxyBanned => "PROXY_BANNED",
    ResourceLimit => "RESOURCE_LIMIT",
    CircuitOpen => "CIRCUIT_OPEN",
    Unknown => "UNKNOWN",
});

impl ErrorKind {
    /// Maps an HTTP status code to its dedicated kind.
    ///
    /// 5xx codes without a dedicated variant collapse into `Http500`. Other
    /// codes return `None` so later classification steps can inspect the
    /// body.
    pub const fn from_status(status: u16) -> Option<Self> {
        match status {
            400 => Some(Self::Http400),
            401 => Some(Self::Http401),
            403 => Some(Self::Http403),
            404 => Some(Self::Http404),
            429 => Some(Self::Http429),
            500 => Some(Self::Http500),
            503 => Some(Self::Http503),
            501..=599 => Some(Self::Http500),
            _ => None,
        }
    }
}
