//! The aggregator: consumes completion events, applies guarded terminal
//! task writes, recomputes the owning job's status, and emits one
//! aggregated result per batch.
//!
//! Roll-up is a pure re-derivation of the task-status multiset guarded
//! by a compare-and-set on the job row, never an assumption about
//! event ordering, so any number of concurrent consumers converge on
//! the same terminal job status.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use sqlcheck_core::repo::{FinishOutcome, RepoError, Repository};
use sqlcheck_core::rollup::derive_job_status;
use sqlcheck_core::task::TaskOutcome;
use sqlcheck_core::types::{BatchId, CorrelationId, JobId, TaskId};
use sqlcheck_events::bus::{BusError, Delivery, EventBus, Topic};
use sqlcheck_events::envelope::Envelope;
use sqlcheck_events::messages::{BatchMeta, BatchResultEvent, CompletionEvent, PerFileResult};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Bounded CAS retries per recompute; a lost race is retried against
/// fresh state, and on give-up the next completion recomputes anyway.
const MAX_CAS_ATTEMPTS: u32 = 8;

#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Bus(#[from] BusError),
}

// ---------------------------------------------------------------------------
// Batch accumulator
// ---------------------------------------------------------------------------

/// Transient per-batch bookkeeping, keyed by batch id and deduplicated
/// by task id. Never persisted; a restart simply never emits the batch
/// summary, which the submitter can reconstruct from the job view.
struct BatchAccumulator {
    job_id: JobId,
    total_files: u32,
    per_task: HashMap<TaskId, PerFileResult>,
}

impl BatchAccumulator {
    fn new(job_id: JobId, total_files: u32) -> Self {
        Self {
            job_id,
            total_files,
            per_task: HashMap::new(),
        }
    }

    /// Record one task's outcome; later entries for the same task are
    /// ignored (exactly one completion is authoritative).
    fn record(&mut self, task_id: TaskId, file_index: u32, outcome: TaskOutcome) {
        self.per_task.entry(task_id).or_insert(PerFileResult {
            file_index,
            task_id,
            outcome,
        });
    }

    fn is_complete(&self) -> bool {
        self.per_task.len() as u32 >= self.total_files
    }

    fn into_event(self, batch_id: BatchId) -> BatchResultEvent {
        let mut per_file: Vec<PerFileResult> = self.per_task.into_values().collect();
        per_file.sort_by_key(|entry| entry.file_index);
        let success_count = per_file
            .iter()
            .filter(|entry| matches!(entry.outcome, TaskOutcome::Success { .. }))
            .count() as u32;
        let failure_count = per_file.len() as u32 - success_count;
        BatchResultEvent {
            job_id: self.job_id,
            batch_id,
            total_files: self.total_files,
            success_count,
            failure_count,
            per_file,
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// Consumes the `completions` topic. Multiple consumers may share one
/// `Arc<Aggregator>`; the batch accumulators are behind a mutex.
pub struct Aggregator {
    repo: Arc<dyn Repository>,
    bus: Arc<dyn EventBus>,
    batches: Mutex<HashMap<BatchId, BatchAccumulator>>,
}

impl Aggregator {
    pub fn new(repo: Arc<dyn Repository>, bus: Arc<dyn EventBus>) -> Self {
        Self {
            repo,
            bus,
            batches: Mutex::new(HashMap::new()),
        }
    }

    /// Run one consume loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), BusError> {
        let mut subscription = self.bus.subscribe(Topic::Completions).await?;
        tracing::info!("Aggregator started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Aggregator shutting down");
                    return Ok(());
                }
                next = subscription.next() => {
                    match next {
                        Some(delivery) => self.handle_delivery(delivery).await,
                        None => {
                            tracing::info!("Completion stream closed");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Process one completion delivery; acked unless a transient
    /// repository/bus error makes redelivery worthwhile.
    pub async fn handle_delivery(&self, delivery: Delivery) {
        let correlation_id = delivery.envelope.correlation_id;
        let completion: CompletionEvent = match delivery.envelope.decode() {
            Ok(completion) => completion,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding undecodable completion event");
                ack_or_log(delivery).await;
                return;
            }
        };

        match self.on_completion(&completion, correlation_id).await {
            Ok(()) => ack_or_log(delivery).await,
            Err(e) => {
                tracing::error!(
                    task_id = %completion.task_id,
                    error = %e,
                    "Completion processing failed; leaving event for redelivery"
                );
                drop(delivery);
            }
        }
    }

    /// Apply one completion event: guarded terminal write, job status
    /// recompute, and batch bookkeeping.
    pub async fn on_completion(
        &self,
        completion: &CompletionEvent,
        correlation_id: CorrelationId,
    ) -> Result<(), AggregateError> {
        // A completion for a task this system never created mutates
        // nothing.
        let Some(task) = self.repo.task_by_id(completion.task_id).await? else {
            tracing::warn!(
                task_id = %completion.task_id,
                job_id = %completion.job_id,
                "Completion for unknown task discarded"
            );
            return Ok(());
        };

        // Guarded terminal write: a no-op when the worker's own write
        // already landed, and the safety net when it did not. The first
        // terminal status is immutable.
        let authoritative = match self.repo.finish_task(completion.task_id, &completion.outcome).await? {
            FinishOutcome::Applied => completion.outcome.clone(),
            FinishOutcome::AlreadyTerminal(winner) => {
                if winner == completion.status() {
                    tracing::debug!(
                        task_id = %completion.task_id,
                        status = %winner,
                        "Duplicate completion ignored"
                    );
                } else {
                    tracing::warn!(
                        task_id = %completion.task_id,
                        existing = %winner,
                        incoming = %completion.status(),
                        "Conflicting completion discarded; first terminal status wins"
                    );
                }
                // The pre-write read saw the winning terminal state.
                task.terminal_outcome().unwrap_or_else(|| completion.outcome.clone())
            }
        };

        self.recompute_job_status(completion.job_id).await?;

        if let Some(meta) = &completion.batch {
            self.track_batch(completion, meta, authoritative, correlation_id)
                .await?;
        }
        Ok(())
    }

    /// Re-derive the job status from the full task-status multiset and
    /// apply it through a compare-and-set loop.
    pub async fn recompute_job_status(&self, job_id: JobId) -> Result<(), AggregateError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let Some(job) = self.repo.job_by_id(job_id).await? else {
                tracing::warn!(job_id = %job_id, "Roll-up for unknown job skipped");
                return Ok(());
            };
            let statuses = self.repo.task_statuses(job_id).await?;
            let derived = derive_job_status(&statuses);

            if job.status == derived {
                return Ok(());
            }
            if !job.status.can_transition_to(derived) {
                // Terminal states are sticky; anything else here means
                // the derivation raced a concurrent recompute.
                tracing::debug!(
                    job_id = %job_id,
                    current = %job.status,
                    derived = %derived,
                    "Roll-up left job status unchanged"
                );
                return Ok(());
            }
            if self
                .repo
                .compare_and_set_job_status(job_id, job.status, derived)
                .await?
            {
                tracing::info!(job_id = %job_id, status = %derived, "Job status recomputed");
                return Ok(());
            }
            // CAS lost against a concurrent consumer; re-derive.
        }
        tracing::warn!(
            job_id = %job_id,
            "Job status CAS contention persisted; next completion will recompute"
        );
        Ok(())
    }

    async fn track_batch(
        &self,
        completion: &CompletionEvent,
        meta: &BatchMeta,
        outcome: TaskOutcome,
        correlation_id: CorrelationId,
    ) -> Result<(), AggregateError> {
        let finished = {
            let mut batches = self.batches.lock().await;
            let accumulator = batches
                .entry(meta.batch_id)
                .or_insert_with(|| BatchAccumulator::new(completion.job_id, meta.total_files));
            accumulator.record(completion.task_id, meta.file_index, outcome);
            if accumulator.is_complete() {
                batches.remove(&meta.batch_id)
            } else {
                None
            }
        };

        if let Some(accumulator) = finished {
            let event = accumulator.into_event(meta.batch_id);
            tracing::info!(
                job_id = %event.job_id,
                batch_id = %event.batch_id,
                success_count = event.success_count,
                failure_count = event.failure_count,
                "Batch result emitted",
            );
            let envelope =
                Envelope::encode(BatchResultEvent::EVENT_TYPE, correlation_id, &event)
                    .map_err(BusError::Codec)?;
            self.bus.publish(Topic::BatchResults, envelope).await?;
        }
        Ok(())
    }
}

async fn ack_or_log(delivery: Delivery) {
    if let Err(e) = delivery.ack().await {
        tracing::warn!(error = %e, "Failed to acknowledge delivery");
    }
}
