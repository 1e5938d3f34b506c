use async_trait::async_trait;
use service_core::error::AppError;
use std::{sync::Arc, time::Duration};
use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::services::{EditingLockManager, TokenStore};

/// Periodic maintenance job. `run` returns the number of rows it removed.
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self) -> Result<u64, AppError>;
}

pub struct TokenSweepJob {
    store: Arc<dyn TokenStore>,
}

impl TokenSweepJob {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ScheduledJob for TokenSweepJob {
    fn name(&self) -> &str {
        "token_sweep"
    }

    async fn run(&self) -> Result<u64, AppError> {
        self.store.sweep_expired().await
    }
}

pub struct LockSweepJob {
    locks: EditingLockManager,
}

impl LockSweepJob {
    pub fn new(locks: EditingLockManager) -> Self {
        Self { locks }
    }
}

#[async_trait]
impl ScheduledJob for LockSweepJob {
    fn name(&self) -> &str {
        "editing_lock_sweep"
    }

    async fn run(&self) -> Result<u64, AppError> {
        self.locks.sweep_expired().await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub name: String,
    pub result: Result<u64, String>,
}

/// Runs its jobs every `frequency`, starting one period after `start`.
///
/// Each job runs in its own task; a failing or panicking job is logged and
/// does not affect the others or later runs.
pub struct Reaper {
    jobs: Vec<Arc<dyn ScheduledJob>>,
    frequency: Duration,
    shutdown_token: CancellationToken,
}

impl Reaper {
    pub fn new(frequency: Duration) -> Self {
        Self {
            jobs: Vec::new(),
            frequency,
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn with_job(mut self, job: Arc<dyn ScheduledJob>) -> Self {
        self.jobs.push(job);
        self
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub async fn run_once(&self) -> Vec<JobOutcome> {
        let handles: Vec<(String, JoinHandle<Result<u64, AppError>>)> = self
            .jobs
            .iter()
            .map(|job| {
                let job = Arc::clone(job);
                (job.name().to_string(), tokio::spawn(async move { job.run().await }))
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            let result = match handle.await {
                Ok(Ok(count)) => {
                    tracing::debug!(job = %name, count, "Scheduled job finished");
                    Ok(count)
                }
                Ok(Err(e)) => {
                    tracing::error!(job = %name, error = %e, "Scheduled job failed");
                    Err(e.to_string())
                }
                Err(e) => {
                    tracing::error!(job = %name, error = %e, "Scheduled job panicked");
                    Err(e.to_string())
                }
            };
            outcomes.push(JobOutcome { name, result });
        }
        outcomes
    }

    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let shutdown = self.shutdown_token.clone();
            let mut ticker = interval_at(Instant::now() + self.frequency, self.frequency);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(
                jobs = self.jobs.len(),
                frequency_seconds = self.frequency.as_secs(),
                "Reaper started"
            );

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("Reaper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                }
            }
        })
    }
}
