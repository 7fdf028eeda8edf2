//! # ScrapeShield Domain
//!
//! Shared vocabulary for the ScrapeShield resilience core.
//!
//! This crate contains:
//! - The closed `ErrorKind` taxonomy and its static `RetryPolicy` table
//! - Proxy, proxy statistics and cache entry records
//! - Domain error types and Result definitions
//! - Configuration structures with serde defaults
//!
//! ## Architecture
//! - No dependencies on other ScrapeShield crates
//! - Only external dependencies allowed
//! - Pure data structures; no I/O, no async

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;
pub mod utils;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
pub use utils::serde::{duration_millis, option_duration_millis};
