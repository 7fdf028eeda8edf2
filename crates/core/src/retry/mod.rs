//! Retry orchestration: classification-driven backoff and recovery

mod orchestrator;
pub mod ports;
mod state;

pub use orchestrator::RetryOrchestrator;
pub use ports::{CaptchaError, CaptchaParams, CaptchaSolver};
pub use state::{RetryContext, RetryOutcome, RetryState};
