//! Tracing subscriber setup

use std::str::FromStr;

use scrapeshield_domain::ScrapeShieldError;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Variable selecting the output format when none is passed explicitly.
pub const LOG_FORMAT_VAR: &str = "SCRAPESHIELD_LOG_FORMAT";

const DEFAULT_FILTER: &str = "info";

/// Shape of emitted log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, multi-line.
    Pretty,
    /// Single-line text.
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = ScrapeShieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" | "text" | "" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(ScrapeShieldError::Config(format!("Unsupported log format: {other}"))),
        }
    }
}

impl LogFormat {
    /// Format named by `SCRAPESHIELD_LOG_FORMAT`, or the default.
    pub fn from_env() -> Self {
        std::env::var(LOG_FORMAT_VAR).ok().and_then(|raw| raw.parse().ok()).unwrap_or_default()
    }
}

/// Install the global subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info`.
///
/// # Errors
/// Returns `ScrapeShieldError::Internal` if a global subscriber is already
/// installed.
pub fn init_tracing(format: LogFormat) -> Result<(), ScrapeShieldError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Json => {
            registry.with(fmt::layer().json().with_current_span(false)).try_init()
        }
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact().with_target(true)).try_init(),
    };

    installed.map_err(|e| ScrapeShieldError::Internal(format!("tracing already initialised: {e}")))?;
    tracing::debug!(?format, "Tracing initialised");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_formats() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert_eq!(" pretty ".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!(matches!("xml".parse::<LogFormat>(), Err(ScrapeShieldError::Config(_))));
    }

    #[test]
    fn second_init_reports_error_instead_of_panicking() {
        let _ = init_tracing(LogFormat::Compact);
        let second = init_tracing(LogFormat::Json);
        assert!(matches!(second, Err(ScrapeShieldError::Internal(_))));
    }
}
