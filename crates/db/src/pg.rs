//! PostgreSQL implementations of the capability traits.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use sqlcheck_core::job::{Job, NewJob};
use sqlcheck_core::lock::{LockError, LockProvider, LockToken};
use sqlcheck_core::repo::{FinishOutcome, RepoError, Repository};
use sqlcheck_core::status::{JobStatus, TaskStatus};
use sqlcheck_core::task::{NewTask, Task, TaskOutcome};
use sqlcheck_core::types::{JobId, TaskId, Timestamp};
use sqlcheck_events::bus::{Acker, BusError, Delivery, EventBus, Subscription, Topic};
use sqlcheck_events::envelope::Envelope;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::status::task_status_from_id;
use crate::repositories::{JobRepo, LockRepo, QueueRepo, TaskRepo};

fn backend(e: sqlx::Error) -> RepoError {
    RepoError::Backend(e.to_string())
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// [`Repository`] over a PostgreSQL pool.
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn insert_job(&self, new: NewJob) -> Result<Job, RepoError> {
        let row = JobRepo::insert(&self.pool, &new).await.map_err(backend)?;
        row.into_domain()
    }

    async fn insert_task(&self, new: NewTask) -> Result<Task, RepoError> {
        let row = TaskRepo::insert(&self.pool, &new).await.map_err(backend)?;
        row.into_domain()
    }

    async fn mark_job_processing(&self, job_id: JobId) -> Result<bool, RepoError> {
        JobRepo::mark_processing(&self.pool, job_id)
            .await
            .map_err(backend)
    }

    async fn fail_job(&self, job_id: JobId, error: &str) -> Result<bool, RepoError> {
        JobRepo::fail(&self.pool, job_id, error)
            .await
            .map_err(backend)
    }

    async fn job_by_id(&self, job_id: JobId) -> Result<Option<Job>, RepoError> {
        match JobRepo::find_by_id(&self.pool, job_id).await.map_err(backend)? {
            Some(row) => Ok(Some(row.into_domain()?)),
            None => Ok(None),
        }
    }

    async fn task_by_id(&self, task_id: TaskId) -> Result<Option<Task>, RepoError> {
        match TaskRepo::find_by_id(&self.pool, task_id)
            .await
            .map_err(backend)?
        {
            Some(row) => Ok(Some(row.into_domain()?)),
            None => Ok(None),
        }
    }

    async fn start_task(&self, task_id: TaskId) -> Result<bool, RepoError> {
        TaskRepo::start(&self.pool, task_id).await.map_err(backend)
    }

    async fn finish_task(
        &self,
        task_id: TaskId,
        outcome: &TaskOutcome,
    ) -> Result<FinishOutcome, RepoError> {
        let (status, result_ref, error) = match outcome {
            TaskOutcome::Success { result_ref } => {
                (TaskStatus::Success, Some(result_ref.as_str()), None)
            }
            TaskOutcome::Failure { error } => (TaskStatus::Failure, None, Some(error.as_str())),
        };
        let applied = TaskRepo::finish(&self.pool, task_id, status, result_ref, error)
            .await
            .map_err(backend)?;
        if applied > 0 {
            return Ok(FinishOutcome::Applied);
        }
        // The guard refused: either the task is unknown or an earlier
        // terminal write won.
        match TaskRepo::status_of(&self.pool, task_id)
            .await
            .map_err(backend)?
        {
            None => Err(RepoError::NotFound {
                entity: "Task",
                id: task_id,
            }),
            Some(id) => {
                let current = task_status_from_id(id)
                    .ok_or_else(|| RepoError::Backend(format!("unknown task status id {id}")))?;
                if current.is_terminal() {
                    Ok(FinishOutcome::AlreadyTerminal(current))
                } else {
                    Err(RepoError::Backend(format!(
                        "terminal write refused for non-terminal task {task_id}"
                    )))
                }
            }
        }
    }

    async fn task_statuses(&self, job_id: JobId) -> Result<Vec<TaskStatus>, RepoError> {
        let ids = TaskRepo::statuses_for_job(&self.pool, job_id)
            .await
            .map_err(backend)?;
        ids.into_iter()
            .map(|id| {
                task_status_from_id(id)
                    .ok_or_else(|| RepoError::Backend(format!("unknown task status id {id}")))
            })
            .collect()
    }

    async fn compare_and_set_job_status(
        &self,
        job_id: JobId,
        expected: JobStatus,
        next: JobStatus,
    ) -> Result<bool, RepoError> {
        JobRepo::compare_and_set_status(&self.pool, job_id, expected, next)
            .await
            .map_err(backend)
    }

    async fn tasks_page(
        &self,
        job_id: JobId,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Task>, i64), RepoError> {
        let (rows, total) = TaskRepo::page_for_job(&self.pool, job_id, limit, offset)
            .await
            .map_err(backend)?;
        let tasks = rows
            .into_iter()
            .map(|row| row.into_domain())
            .collect::<Result<Vec<_>, _>>()?;
        Ok((tasks, total))
    }

    async fn stalled_tasks(
        &self,
        cutoff: Timestamp,
        limit: i64,
    ) -> Result<Vec<Task>, RepoError> {
        let rows = TaskRepo::stalled(&self.pool, cutoff, limit)
            .await
            .map_err(backend)?;
        rows.into_iter().map(|row| row.into_domain()).collect()
    }
}

// ---------------------------------------------------------------------------
// Lock provider
// ---------------------------------------------------------------------------

/// [`LockProvider`] over the `task_locks` table.
#[derive(Clone)]
pub struct PgLockProvider {
    pool: PgPool,
}

impl PgLockProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockProvider for PgLockProvider {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, LockError> {
        let token = Uuid::new_v4();
        let acquired = LockRepo::acquire(&self.pool, key, token, ttl.as_secs_f64())
            .await
            .map_err(|e| LockError::Backend(e.to_string()))?;
        Ok(acquired.then(|| LockToken {
            key: key.to_string(),
            token,
        }))
    }

    async fn renew(&self, token: &LockToken, ttl: Duration) -> Result<bool, LockError> {
        LockRepo::renew(&self.pool, &token.key, token.token, ttl.as_secs_f64())
            .await
            .map_err(|e| LockError::Backend(e.to_string()))
    }

    async fn release(&self, token: LockToken) -> Result<(), LockError> {
        LockRepo::release(&self.pool, &token.key, token.token)
            .await
            .map_err(|e| LockError::Backend(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Durable queue bus
// ---------------------------------------------------------------------------

/// Default claim poll interval.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default redelivery lease on a claimed message.
const DEFAULT_LEASE: Duration = Duration::from_secs(120);

/// Default bus-level delivery attempts before a message is parked.
const DEFAULT_MAX_ATTEMPTS: i32 = 5;

/// Durable at-least-once [`EventBus`] over the `bus_messages` table.
///
/// Consumers poll with `FOR UPDATE SKIP LOCKED`; an acked delivery
/// deletes its row, an unacked one reappears after the lease expires,
/// and a message that exhausts its attempts is parked and logged.
#[derive(Clone)]
pub struct PgQueueBus {
    pool: PgPool,
    poll_interval: Duration,
    lease: Duration,
    max_attempts: i32,
}

impl PgQueueBus {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            poll_interval: DEFAULT_POLL_INTERVAL,
            lease: DEFAULT_LEASE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_settings(
        pool: PgPool,
        poll_interval: Duration,
        lease: Duration,
        max_attempts: i32,
    ) -> Self {
        Self {
            pool,
            poll_interval,
            lease,
            max_attempts,
        }
    }
}

struct PgAcker {
    pool: PgPool,
    id: i64,
}

#[async_trait]
impl Acker for PgAcker {
    async fn ack(self: Box<Self>) -> Result<(), BusError> {
        QueueRepo::delete(&self.pool, self.id)
            .await
            .map_err(|e| BusError::Backend(e.to_string()))
    }
}

struct PollState {
    pool: PgPool,
    topic: Topic,
    poll_interval: Duration,
    lease_secs: f64,
    max_attempts: i32,
}

#[async_trait]
impl EventBus for PgQueueBus {
    async fn publish(&self, topic: Topic, envelope: Envelope) -> Result<(), BusError> {
        let value = serde_json::to_value(&envelope)?;
        QueueRepo::enqueue(&self.pool, topic.as_str(), &value)
            .await
            .map_err(|e| BusError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn subscribe(&self, topic: Topic) -> Result<Subscription, BusError> {
        let state = PollState {
            pool: self.pool.clone(),
            topic,
            poll_interval: self.poll_interval,
            lease_secs: self.lease.as_secs_f64(),
            max_attempts: self.max_attempts,
        };
        let stream = futures::stream::unfold(state, |state| async move {
            loop {
                let claimed = QueueRepo::claim_next(
                    &state.pool,
                    state.topic.as_str(),
                    state.lease_secs,
                    state.max_attempts,
                )
                .await;
                match claimed {
                    Ok(Some(row)) => {
                        match serde_json::from_value::<Envelope>(row.envelope) {
                            Ok(envelope) => {
                                let acker = PgAcker {
                                    pool: state.pool.clone(),
                                    id: row.id,
                                };
                                return Some((
                                    Delivery::with_acker(envelope, Box::new(acker)),
                                    state,
                                ));
                            }
                            Err(e) => {
                                // A message that cannot decode will never
                                // decode; consume it instead of looping.
                                tracing::error!(
                                    id = row.id,
                                    topic = %state.topic,
                                    error = %e,
                                    "Dropping undecodable bus message"
                                );
                                if let Err(e) = QueueRepo::delete(&state.pool, row.id).await {
                                    tracing::error!(
                                        id = row.id,
                                        error = %e,
                                        "Failed to delete undecodable bus message"
                                    );
                                }
                            }
                        }
                    }
                    Ok(None) => {
                        match QueueRepo::park_exhausted(
                            &state.pool,
                            state.topic.as_str(),
                            state.max_attempts,
                        )
                        .await
                        {
                            Ok(parked) if parked > 0 => {
                                tracing::warn!(
                                    topic = %state.topic,
                                    parked,
                                    "Parked messages after exhausted delivery attempts"
                                );
                            }
                            Ok(_) => {}
                            Err(e) => {
                                tracing::error!(error = %e, "Failed to park exhausted messages");
                            }
                        }
                        tokio::time::sleep(state.poll_interval).await;
                    }
                    Err(e) => {
                        tracing::error!(
                            topic = %state.topic,
                            error = %e,
                            "Bus claim query failed"
                        );
                        tokio::time::sleep(state.poll_interval).await;
                    }
                }
            }
        });
        Ok(stream.boxed())
    }
}
