//! Error types used throughout the workspace

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for ScrapeShield services
///
/// Scrape failures themselves are not represented here; they travel as
/// classified errors through the retry orchestrator. This type covers the
/// plumbing around it: configuration, persistence, probes.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum ScrapeShieldError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for ScrapeShield operations
pub type Result<T> = std::result::Result<T, ScrapeShieldError>;
