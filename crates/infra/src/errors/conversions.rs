//! Conversions from external infrastructure errors into domain errors.

use std::io::{Error as IoError, ErrorKind as IoErrorKind};

use prometheus::Error as PrometheusError;
use reqwest::Error as HttpError;
use scrapeshield_domain::ScrapeShieldError;
use serde_json::Error as JsonError;
use thiserror::Error;
use toml::de::Error as TomlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct InfraError(pub ScrapeShieldError);

impl From<InfraError> for ScrapeShieldError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<ScrapeShieldError> for InfraError {
    fn from(value: ScrapeShieldError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoScrapeShieldError {
    fn into_scrapeshield(self) -> ScrapeShieldError;
}

/* -------------------------------------------------------------------------- */
/* std::io::Error → ScrapeShieldError */
/* -------------------------------------------------------------------------- */

impl IntoScrapeShieldError for IoError {
    fn into_scrapeshield(self) -> ScrapeShieldError {
        match self.kind() {
            IoErrorKind::NotFound => ScrapeShieldError::NotFound(self.to_string()),
            IoErrorKind::PermissionDenied => {
                ScrapeShieldError::Persistence(format!("permission denied: {self}"))
            }
            IoErrorKind::InvalidData | IoErrorKind::UnexpectedEof => {
                ScrapeShieldError::Persistence(format!("corrupt file contents: {self}"))
            }
            _ => ScrapeShieldError::Persistence(self.to_string()),
        }
    }
}

impl From<IoError> for InfraError {
    fn from(value: IoError) -> Self {
        InfraError(value.into_scrapeshield())
    }
}

/* -------------------------------------------------------------------------- */
/* serde_json::Error → ScrapeShieldError */
/* -------------------------------------------------------------------------- */

impl IntoScrapeShieldError for JsonError {
    fn into_scrapeshield(self) -> ScrapeShieldError {
        use serde_json::error::Category;

        match self.classify() {
            Category::Io => ScrapeShieldError::Persistence(format!("JSON I/O failure: {self}")),
            Category::Syntax | Category::Eof => {
                ScrapeShieldError::Persistence(format!("malformed JSON: {self}"))
            }
            Category::Data => ScrapeShieldError::InvalidInput(format!("unexpected JSON shape: {self}")),
        }
    }
}

impl From<JsonError> for InfraError {
    fn from(value: JsonError) -> Self {
        InfraError(value.into_scrapeshield())
    }
}

/* -------------------------------------------------------------------------- */
/* toml::de::Error → ScrapeShieldError */
/* -------------------------------------------------------------------------- */

impl IntoScrapeShieldError for TomlError {
    fn into_scrapeshield(self) -> ScrapeShieldError {
        ScrapeShieldError::Config(format!("Invalid TOML format: {self}"))
    }
}

impl From<TomlError> for InfraError {
    fn from(value: TomlError) -> Self {
        InfraError(value.into_scrapeshield())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → ScrapeShieldError */
/* -------------------------------------------------------------------------- */

impl IntoScrapeShieldError for HttpError {
    fn into_scrapeshield(self) -> ScrapeShieldError {
        if self.is_timeout() {
            return ScrapeShieldError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return ScrapeShieldError::Network("HTTP connection failure".into());
        }

        if self.is_builder() {
            return ScrapeShieldError::InvalidInput(format!("invalid HTTP request: {self}"));
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                404 => ScrapeShieldError::NotFound(message),
                429 => ScrapeShieldError::Network(message),
                400..=499 => ScrapeShieldError::InvalidInput(message),
                _ => ScrapeShieldError::Network(message),
            };
        }

        ScrapeShieldError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_scrapeshield())
    }
}

/* -------------------------------------------------------------------------- */
/* prometheus::Error → ScrapeShieldError */
/* -------------------------------------------------------------------------- */

impl IntoScrapeShieldError for PrometheusError {
    fn into_scrapeshield(self) -> ScrapeShieldError {
        match self {
            PrometheusError::AlreadyReg => {
                ScrapeShieldError::InvalidInput("metric already registered".into())
            }
            PrometheusError::InconsistentCardinality { expect, got } => {
                ScrapeShieldError::InvalidInput(format!(
                    "metric label cardinality mismatch: expected {expect}, got {got}"
                ))
            }
            other => ScrapeShieldError::Internal(format!("prometheus: {other}")),
        }
    }
}

impl From<PrometheusError> for InfraError {
    fn from(value: PrometheusError) -> Self {
        InfraError(value.into_scrapeshield())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
