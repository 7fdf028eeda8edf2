//! Resilience building blocks shared by the core services
//!
//! - [`clock`]: injectable time source with a mock for tests
//! - [`backoff`]: capped, jittered retry delays

pub mod backoff;
pub mod clock;

pub use backoff::{Backoff, BackoffError};
pub use clock::{Clock, MockClock, SystemClock};
