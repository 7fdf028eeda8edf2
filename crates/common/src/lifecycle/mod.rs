//! Background task lifecycle

pub mod periodic;

pub use periodic::{JobError, PeriodicJob, PeriodicTask, PeriodicTaskConfig, TaskError};
