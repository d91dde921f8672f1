//! Best-effort sweep for tasks the bus gave up on.
//!
//! A task stuck non-terminal past the stall window (lock expired,
//! bus-level redelivery exhausted) is forced to FAILURE and its job
//! recomputed, so every submission still reaches a terminal status.
//! The sweep takes the task's execution lock first, so a slow but live
//! owner is never clobbered mid-run.

use std::sync::Arc;

use chrono::Utc;
use sqlcheck_core::lock::{task_lock_key, LockProvider};
use sqlcheck_core::repo::{FinishOutcome, Repository};
use sqlcheck_core::task::{Task, TaskOutcome};
use sqlcheck_core::EngineConfig;
use tokio_util::sync::CancellationToken;

use crate::aggregator::Aggregator;

/// Upper bound on tasks handled per sweep cycle.
const SWEEP_LIMIT: i64 = 100;

/// Error recorded on a force-failed task.
const SWEEP_ERROR: &str = "max retries exceeded";

/// Periodic stalled-task reaper.
pub struct Sweeper {
    repo: Arc<dyn Repository>,
    locks: Arc<dyn LockProvider>,
    aggregator: Arc<Aggregator>,
    config: EngineConfig,
}

impl Sweeper {
    pub fn new(
        repo: Arc<dyn Repository>,
        locks: Arc<dyn LockProvider>,
        aggregator: Arc<Aggregator>,
        config: EngineConfig,
    ) -> Self {
        Self {
            repo,
            locks,
            aggregator,
            config,
        }
    }

    /// Run the sweep loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.sweep_interval);
        tracing::info!(
            interval_secs = self.config.sweep_interval.as_secs(),
            stall_after_secs = self.config.stall_after.as_secs(),
            "Stalled-task sweeper started",
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Sweeper shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        tracing::error!(error = %e, "Sweep cycle failed");
                    }
                }
            }
        }
    }

    /// One sweep cycle. Returns how many tasks were force-failed.
    pub async fn sweep_once(&self) -> Result<usize, crate::aggregator::AggregateError> {
        let stall = chrono::Duration::from_std(self.config.stall_after)
            .unwrap_or_else(|_| chrono::Duration::minutes(15));
        let cutoff = Utc::now() - stall;

        let stalled = self.repo.stalled_tasks(cutoff, SWEEP_LIMIT).await?;
        let mut failed = 0usize;
        for task in stalled {
            if self.force_fail(&task).await? {
                failed += 1;
            }
        }
        if failed > 0 {
            tracing::warn!(failed, "Sweep forced stalled tasks to FAILURE");
        }
        Ok(failed)
    }

    /// Force one stalled task to FAILURE under its execution lock.
    async fn force_fail(&self, task: &Task) -> Result<bool, crate::aggregator::AggregateError> {
        let key = task_lock_key(task.task_id);
        let token = match self.locks.acquire(&key, self.config.lock_ttl).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                // A live owner holds the lock; not stalled after all.
                return Ok(false);
            }
            Err(e) => {
                tracing::warn!(task_id = %task.task_id, error = %e, "Sweep lock acquire failed");
                return Ok(false);
            }
        };

        let outcome = TaskOutcome::Failure {
            error: SWEEP_ERROR.to_string(),
        };
        let result = self.repo.finish_task(task.task_id, &outcome).await;

        if let Err(e) = self.locks.release(token).await {
            tracing::warn!(task_id = %task.task_id, error = %e, "Sweep lock release failed");
        }

        match result? {
            FinishOutcome::Applied => {
                tracing::warn!(
                    task_id = %task.task_id,
                    job_id = %task.job_id,
                    "Stalled task forced to FAILURE",
                );
                self.aggregator.recompute_job_status(task.job_id).await?;
                Ok(true)
            }
            FinishOutcome::AlreadyTerminal(_) => Ok(false),
        }
    }
}
