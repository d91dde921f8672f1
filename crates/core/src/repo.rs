//! The repository capability: the only shared mutable state in the
//! system, written exclusively through three operation classes.
//!
//! - creation transitions belong to the dispatcher,
//! - execution transitions belong to the worker holding the task lock,
//! - roll-up transitions belong to the aggregator.
//!
//! Every mutating method is a guarded transition: it applies only when
//! the current status permits it and reports whether it did, so callers
//! never overwrite a terminal state regardless of delivery order or
//! races between consumers.

use async_trait::async_trait;

use crate::job::{Job, NewJob};
use crate::status::{JobStatus, TaskStatus};
use crate::task::{NewTask, Task, TaskOutcome};
use crate::types::{JobId, TaskId, Timestamp};

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("Entity not found: {entity} {id}")]
    NotFound {
        entity: &'static str,
        id: uuid::Uuid,
    },

    #[error("Repository backend error: {0}")]
    Backend(String),
}

/// Result of a guarded terminal task write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishOutcome {
    /// The terminal status was written by this call.
    Applied,
    /// An earlier terminal write won; its status is returned and the
    /// row was left untouched.
    AlreadyTerminal(TaskStatus),
}

#[async_trait]
pub trait Repository: Send + Sync {
    // -- Creation (dispatcher-owned) ---------------------------------------

    /// Insert a job with status `Accepted`.
    async fn insert_job(&self, new: NewJob) -> Result<Job, RepoError>;

    /// Insert a task with status `Pending`.
    async fn insert_task(&self, new: NewTask) -> Result<Task, RepoError>;

    /// `Accepted -> Processing` once decomposition succeeded.
    /// Returns `false` if the job was not in `Accepted`.
    async fn mark_job_processing(&self, job_id: JobId) -> Result<bool, RepoError>;

    /// Job-level failure (decomposition path): any non-terminal status
    /// to `Failed`, recording the error. Returns `false` if the job was
    /// already terminal.
    async fn fail_job(&self, job_id: JobId, error: &str) -> Result<bool, RepoError>;

    // -- Execution (worker-owned, under the task lock) ---------------------

    async fn job_by_id(&self, job_id: JobId) -> Result<Option<Job>, RepoError>;

    async fn task_by_id(&self, task_id: TaskId) -> Result<Option<Task>, RepoError>;

    /// `Pending -> InProgress`. Also succeeds when the task is already
    /// `InProgress` so a new lock owner can resume after a crashed one.
    /// Returns `false` for terminal tasks.
    async fn start_task(&self, task_id: TaskId) -> Result<bool, RepoError>;

    /// Guarded terminal write. The first terminal status wins; later
    /// calls leave the row untouched and report the winner.
    async fn finish_task(
        &self,
        task_id: TaskId,
        outcome: &TaskOutcome,
    ) -> Result<FinishOutcome, RepoError>;

    // -- Roll-up (aggregator-owned) ----------------------------------------

    /// Statuses of every task belonging to the job, in no defined order.
    async fn task_statuses(&self, job_id: JobId) -> Result<Vec<TaskStatus>, RepoError>;

    /// Atomic compare-and-set on the job's status field. Returns `true`
    /// only if the job was in `expected` and is now `next`.
    async fn compare_and_set_job_status(
        &self,
        job_id: JobId,
        expected: JobStatus,
        next: JobStatus,
    ) -> Result<bool, RepoError>;

    // -- Query surface ------------------------------------------------------

    /// One page of a job's tasks (insertion order) plus the total count.
    async fn tasks_page(
        &self,
        job_id: JobId,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Task>, i64), RepoError>;

    // -- Sweep --------------------------------------------------------------

    /// Non-terminal tasks whose last update is older than `cutoff`.
    async fn stalled_tasks(
        &self,
        cutoff: Timestamp,
        limit: i64,
    ) -> Result<Vec<Task>, RepoError>;
}
