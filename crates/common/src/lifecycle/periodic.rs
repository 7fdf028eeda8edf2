//! Interval-driven background jobs with explicit lifecycle
//!
//! Each [`PeriodicTask`] owns one spawned loop. Start and stop are explicit;
//! the join handle is tracked and awaited with a timeout on stop, and
//! dropping a running task cancels it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Boxed error returned by a job run.
pub type JobError = Box<dyn std::error::Error + Send + Sync>;

/// Work executed on every tick.
#[async_trait]
pub trait PeriodicJob: Send + Sync {
    /// Execute one round.
    async fn run(&self) -> Result<(), JobError>;
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task {0} already running")]
    AlreadyRunning(String),

    #[error("task {0} not running")]
    NotRunning(String),

    #[error("task {name} did not stop within {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    #[error("task {name} join failed: {message}")]
    JoinFailed { name: String, message: String },
}

/// Timing for a periodic task.
#[derive(Debug, Clone)]
pub struct PeriodicTaskConfig {
    pub interval: Duration,
    /// Timeout applied to a single run.
    pub job_timeout: Duration,
    /// Timeout for awaiting the loop on stop.
    pub join_timeout: Duration,
    /// Run once immediately instead of waiting a full interval.
    pub run_immediately: bool,
}

impl PeriodicTaskConfig {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            job_timeout: interval.max(Duration::from_secs(1)),
            join_timeout: Duration::from_secs(5),
            run_immediately: false,
        }
    }
}

/// A named background loop.
pub struct PeriodicTask {
    name: String,
    config: PeriodicTaskConfig,
    job: Arc<dyn PeriodicJob>,
    cancellation: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    pub fn new(
        name: impl Into<String>,
        config: PeriodicTaskConfig,
        job: Arc<dyn PeriodicJob>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            job,
            cancellation: CancellationToken::new(),
            handle: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True while the loop is alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Spawn the loop on the current runtime.
    #[instrument(skip(self), fields(task = %self.name))]
    pub fn start(&mut self) -> Result<(), TaskError> {
        if self.is_running() {
            return Err(TaskError::AlreadyRunning(self.name.clone()));
        }

        self.cancellation = CancellationToken::new();
        let cancel = self.cancellation.clone();
        let job = Arc::clone(&self.job);
        let config = self.config.clone();
        let name = self.name.clone();

        self.handle = Some(tokio::spawn(async move {
            Self::run_loop(name, config, job, cancel).await;
        }));
        info!(interval_ms = self.config.interval.as_millis() as u64, "Periodic task started");
        Ok(())
    }

    /// Cancel the loop and wait for it to exit.
    #[instrument(skip(self), fields(task = %self.name))]
    pub async fn stop(&mut self) -> Result<(), TaskError> {
        let Some(handle) = self.handle.take() else {
            return Err(TaskError::NotRunning(self.name.clone()));
        };

        self.cancellation.cancel();
        let timeout = self.config.join_timeout;
        tokio::time::timeout(timeout, handle)
            .await
            .map_err(|_| TaskError::Timeout { name: self.name.clone(), timeout })?
            .map_err(|err| TaskError::JoinFailed {
                name: self.name.clone(),
                message: err.to_string(),
            })?;

        info!("Periodic task stopped");
        Ok(())
    }

    async fn run_loop(
        name: String,
        config: PeriodicTaskConfig,
        job: Arc<dyn PeriodicJob>,
        cancel: CancellationToken,
    ) {
        let start = if config.run_immediately {
            tokio::time::Instant::now()
        } else {
            tokio::time::Instant::now() + config.interval
        };
        let mut ticker = tokio::time::interval_at(start, config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!(task = %name, "Periodic task cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    let started = Instant::now();
                    match tokio::time::timeout(config.job_timeout, job.run()).await {
                        Ok(Ok(())) => {
                            debug!(task = %name, elapsed_ms = started.elapsed().as_millis() as u64, "Periodic job finished");
                        }
                        Ok(Err(err)) => error!(task = %name, error = %err, "Periodic job failed"),
                        Err(_) => warn!(
                            task = %name,
                            timeout_ms = config.job_timeout.as_millis() as u64,
                            "Periodic job timed out"
                        ),
                    }
                }
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        if self.is_running() {
            warn!(task = %self.name, "PeriodicTask dropped while running; cancelling");
            self.cancellation.cancel();
        }
    }
}
