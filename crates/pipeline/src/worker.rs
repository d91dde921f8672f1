//! The worker: consumes request events and executes analysis under the
//! task's distributed lock.
//!
//! The lock acquisition is the idempotency boundary demanded by
//! at-least-once delivery: losing the race means another owner is (or
//! was) handling the task and the event is dropped. After acquiring,
//! the persisted task status is re-read so a redelivery arriving after
//! completion, but before the stale lock expired, is also dropped.

use std::sync::Arc;

use futures::StreamExt;
use sqlcheck_core::analyze::SqlAnalyzer;
use sqlcheck_core::lock::{task_lock_key, LockError, LockProvider, LockToken};
use sqlcheck_core::repo::{FinishOutcome, RepoError, Repository};
use sqlcheck_core::retry::with_retry;
use sqlcheck_core::storage::{self, FileStore};
use sqlcheck_core::task::TaskOutcome;
use sqlcheck_core::types::CorrelationId;
use sqlcheck_core::EngineConfig;
use sqlcheck_events::bus::{BusError, Delivery, EventBus, Topic};
use sqlcheck_events::envelope::Envelope;
use sqlcheck_events::messages::{CompletionEvent, RequestEvent};
use tokio_util::sync::CancellationToken;

/// Why a delivery was handled without executing the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Handled {
    /// The task was executed (or its completion re-emitted).
    Completed,
    /// Deliberately dropped; the reason is for logs only.
    Dropped(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum WorkerError {
    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Lock(#[from] LockError),
}

/// One worker consumer. Any number of workers, in this process or
/// others, may run against the same bus and repository.
pub struct Worker {
    repo: Arc<dyn Repository>,
    bus: Arc<dyn EventBus>,
    locks: Arc<dyn LockProvider>,
    store: Arc<dyn FileStore>,
    analyzer: Arc<dyn SqlAnalyzer>,
    config: EngineConfig,
    worker_id: String,
}

impl Worker {
    pub fn new(
        repo: Arc<dyn Repository>,
        bus: Arc<dyn EventBus>,
        locks: Arc<dyn LockProvider>,
        store: Arc<dyn FileStore>,
        analyzer: Arc<dyn SqlAnalyzer>,
        config: EngineConfig,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            bus,
            locks,
            store,
            analyzer,
            config,
            worker_id: worker_id.into(),
        }
    }

    /// Run the consume loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), BusError> {
        let mut subscription = self.bus.subscribe(Topic::Requests).await?;
        tracing::info!(worker_id = %self.worker_id, "Worker started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(worker_id = %self.worker_id, "Worker shutting down");
                    return Ok(());
                }
                next = subscription.next() => {
                    match next {
                        Some(delivery) => self.handle_delivery(delivery).await,
                        None => {
                            tracing::info!(worker_id = %self.worker_id, "Request stream closed");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Process one delivery end to end.
    ///
    /// Acknowledged when the event was fully processed or deliberately
    /// dropped; left unacked on transient infrastructure errors so a
    /// durable bus redelivers it.
    pub async fn handle_delivery(&self, delivery: Delivery) {
        let correlation_id = delivery.envelope.correlation_id;
        let request: RequestEvent = match delivery.envelope.decode() {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(
                    worker_id = %self.worker_id,
                    error = %e,
                    "Discarding undecodable request event"
                );
                ack_or_log(delivery).await;
                return;
            }
        };

        match self.process(&request, correlation_id).await {
            Ok(Handled::Completed) => {
                ack_or_log(delivery).await;
            }
            Ok(Handled::Dropped(reason)) => {
                tracing::debug!(
                    worker_id = %self.worker_id,
                    task_id = %request.task_id(),
                    reason,
                    "Request dropped"
                );
                ack_or_log(delivery).await;
            }
            Err(e) => {
                // Transient infrastructure failure: leave the delivery
                // unacked so the bus redelivers it.
                tracing::error!(
                    worker_id = %self.worker_id,
                    task_id = %request.task_id(),
                    error = %e,
                    "Request processing failed; leaving event for redelivery"
                );
                drop(delivery);
            }
        }
    }

    pub(crate) async fn process(
        &self,
        request: &RequestEvent,
        correlation_id: CorrelationId,
    ) -> Result<Handled, WorkerError> {
        let key = task_lock_key(request.task_id());
        let Some(token) = self.locks.acquire(&key, self.config.lock_ttl).await? else {
            return Ok(Handled::Dropped("lock held by another owner"));
        };

        let result = self.execute_locked(request, &token, correlation_id).await;

        if let Err(e) = self.locks.release(token).await {
            tracing::warn!(
                worker_id = %self.worker_id,
                task_id = %request.task_id(),
                error = %e,
                "Failed to release task lock (TTL will reclaim it)"
            );
        }
        result
    }

    async fn execute_locked(
        &self,
        request: &RequestEvent,
        token: &LockToken,
        correlation_id: CorrelationId,
    ) -> Result<Handled, WorkerError> {
        let task_id = request.task_id();

        let Some(task) = self.repo.task_by_id(task_id).await? else {
            tracing::warn!(task_id = %task_id, "Request for unknown task discarded");
            return Ok(Handled::Dropped("unknown task"));
        };

        if task.status.is_terminal() {
            // Redelivery after a finished run. The terminal state is
            // authoritative; re-emit its completion in case the
            // original publish was lost, and drop.
            if let Some(outcome) = task.terminal_outcome() {
                self.publish_completion(request, outcome, correlation_id)
                    .await?;
            }
            return Ok(Handled::Completed);
        }

        if !self.repo.start_task(task_id).await? {
            return Ok(Handled::Dropped("task no longer startable"));
        }

        tracing::info!(
            worker_id = %self.worker_id,
            job_id = %request.job_id(),
            task_id = %task_id,
            file_ref = %request.file_ref(),
            dialect = %request.dialect(),
            "Task execution started",
        );

        let outcome = self.execute_analysis(request, token).await;
        let status = outcome.status();

        match self.repo.finish_task(task_id, &outcome).await? {
            FinishOutcome::Applied => {
                tracing::info!(
                    worker_id = %self.worker_id,
                    task_id = %task_id,
                    status = %status,
                    "Task finished",
                );
                self.publish_completion(request, outcome, correlation_id)
                    .await?;
            }
            FinishOutcome::AlreadyTerminal(winner) => {
                // First completion wins; the winner already published.
                tracing::warn!(
                    worker_id = %self.worker_id,
                    task_id = %task_id,
                    attempted = %status,
                    winner = %winner,
                    "Task was finished elsewhere; discarding this outcome",
                );
            }
        }
        Ok(Handled::Completed)
    }

    /// Fetch, analyze, persist. Storage failures are retried with
    /// bounded backoff and escalate into a task failure on exhaustion;
    /// analysis failures are deterministic and terminal immediately.
    async fn execute_analysis(&self, request: &RequestEvent, token: &LockToken) -> TaskOutcome {
        let file_ref = request.file_ref();
        let sql = {
            let store = Arc::clone(&self.store);
            let file_ref = file_ref.clone();
            with_retry(&self.config.retry, move || {
                let store = Arc::clone(&store);
                let file_ref = file_ref.clone();
                async move { store.read_text(&file_ref).await }
            })
            .await
        };
        let sql = match sql {
            Ok(sql) => sql,
            Err(e) => {
                return TaskOutcome::Failure {
                    error: format!("content fetch failed after retries: {e}"),
                }
            }
        };

        let report = match self
            .analyzer
            .analyze(&sql, file_ref.file_name(), request.dialect(), request.rules())
            .await
        {
            Ok(report) => report,
            Err(e) => return TaskOutcome::Failure { error: e.to_string() },
        };

        // The analysis may have consumed a good part of the TTL; extend
        // it before the persistence round-trips.
        match self.locks.renew(token, self.config.lock_ttl).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(
                    task_id = %request.task_id(),
                    "Lock lost during analysis; continuing, first completion wins"
                );
            }
            Err(e) => {
                tracing::warn!(task_id = %request.task_id(), error = %e, "Lock renew failed");
            }
        }

        let json = match serde_json::to_string_pretty(&report) {
            Ok(json) => json,
            Err(e) => {
                return TaskOutcome::Failure {
                    error: format!("report serialization failed: {e}"),
                }
            }
        };

        let result_ref = storage::result_ref(request.job_id(), request.task_id());
        let written = {
            let store = Arc::clone(&self.store);
            let result_ref = result_ref.clone();
            with_retry(&self.config.retry, move || {
                let store = Arc::clone(&store);
                let result_ref = result_ref.clone();
                let json = json.clone();
                async move { store.write_text(&result_ref, &json).await }
            })
            .await
        };
        match written {
            Ok(()) => TaskOutcome::Success { result_ref },
            Err(e) => TaskOutcome::Failure {
                error: format!("result persistence failed after retries: {e}"),
            },
        }
    }

    async fn publish_completion(
        &self,
        request: &RequestEvent,
        outcome: TaskOutcome,
        correlation_id: CorrelationId,
    ) -> Result<(), WorkerError> {
        let completion = CompletionEvent {
            job_id: request.job_id(),
            task_id: request.task_id(),
            outcome,
            batch: request.batch().cloned(),
        };
        let envelope = Envelope::encode(CompletionEvent::EVENT_TYPE, correlation_id, &completion)
            .map_err(BusError::Codec)?;
        self.bus.publish(Topic::Completions, envelope).await?;
        Ok(())
    }
}

async fn ack_or_log(delivery: Delivery) {
    if let Err(e) = delivery.ack().await {
        tracing::warn!(error = %e, "Failed to acknowledge delivery");
    }
}
