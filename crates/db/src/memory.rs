//! In-memory [`Repository`] backend.
//!
//! Honors exactly the same guarded-transition contracts as
//! [`PgRepository`](crate::pg::PgRepository); used by the embedded
//! service mode and the integration test suites.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlcheck_core::job::{Job, NewJob};
use sqlcheck_core::repo::{FinishOutcome, RepoError, Repository};
use sqlcheck_core::status::{JobStatus, TaskStatus};
use sqlcheck_core::task::{NewTask, Task, TaskOutcome};
use sqlcheck_core::types::{JobId, TaskId, Timestamp};
use tokio::sync::Mutex;

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, Job>,
    tasks: HashMap<TaskId, Task>,
    /// Task ids per job in insertion order, for stable pagination.
    job_tasks: HashMap<JobId, Vec<TaskId>>,
}

/// Map-backed repository.
#[derive(Default)]
pub struct MemoryRepository {
    inner: Mutex<Inner>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn insert_job(&self, new: NewJob) -> Result<Job, RepoError> {
        let mut inner = self.inner.lock().await;
        if inner.jobs.contains_key(&new.job_id) {
            return Err(RepoError::Backend(format!(
                "duplicate job id {}",
                new.job_id
            )));
        }
        let now = Utc::now();
        let job = Job {
            job_id: new.job_id,
            status: JobStatus::Accepted,
            submission_kind: new.submission_kind,
            source_ref: new.source_ref,
            batch_expected_count: new.batch_expected_count,
            dialect: new.dialect,
            error: None,
            created_at: now,
            updated_at: now,
        };
        inner.jobs.insert(job.job_id, job.clone());
        inner.job_tasks.entry(job.job_id).or_default();
        Ok(job)
    }

    async fn insert_task(&self, new: NewTask) -> Result<Task, RepoError> {
        let mut inner = self.inner.lock().await;
        if !inner.jobs.contains_key(&new.job_id) {
            return Err(RepoError::NotFound {
                entity: "Job",
                id: new.job_id,
            });
        }
        let now = Utc::now();
        let task = Task {
            task_id: new.task_id,
            job_id: new.job_id,
            status: TaskStatus::Pending,
            file_ref: new.file_ref,
            result_ref: None,
            error: None,
            created_at: now,
            updated_at: now,
        };
        inner.tasks.insert(task.task_id, task.clone());
        inner
            .job_tasks
            .entry(task.job_id)
            .or_default()
            .push(task.task_id);
        Ok(task)
    }

    async fn mark_job_processing(&self, job_id: JobId) -> Result<bool, RepoError> {
        let mut inner = self.inner.lock().await;
        match inner.jobs.get_mut(&job_id) {
            Some(job) if job.status == JobStatus::Accepted => {
                job.status = JobStatus::Processing;
                job.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn fail_job(&self, job_id: JobId, error: &str) -> Result<bool, RepoError> {
        let mut inner = self.inner.lock().await;
        match inner.jobs.get_mut(&job_id) {
            Some(job) if !job.status.is_terminal() => {
                job.status = JobStatus::Failed;
                job.error = Some(error.to_string());
                job.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn job_by_id(&self, job_id: JobId) -> Result<Option<Job>, RepoError> {
        let inner = self.inner.lock().await;
        Ok(inner.jobs.get(&job_id).cloned())
    }

    async fn task_by_id(&self, task_id: TaskId) -> Result<Option<Task>, RepoError> {
        let inner = self.inner.lock().await;
        Ok(inner.tasks.get(&task_id).cloned())
    }

    async fn start_task(&self, task_id: TaskId) -> Result<bool, RepoError> {
        let mut inner = self.inner.lock().await;
        match inner.tasks.get_mut(&task_id) {
            Some(task)
                if matches!(task.status, TaskStatus::Pending | TaskStatus::InProgress) =>
            {
                task.status = TaskStatus::InProgress;
                task.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn finish_task(
        &self,
        task_id: TaskId,
        outcome: &TaskOutcome,
    ) -> Result<FinishOutcome, RepoError> {
        let mut inner = self.inner.lock().await;
        let task = inner.tasks.get_mut(&task_id).ok_or(RepoError::NotFound {
            entity: "Task",
            id: task_id,
        })?;
        if task.status.is_terminal() {
            return Ok(FinishOutcome::AlreadyTerminal(task.status));
        }
        match outcome {
            TaskOutcome::Success { result_ref } => {
                task.status = TaskStatus::Success;
                task.result_ref = Some(result_ref.clone());
                task.error = None;
            }
            TaskOutcome::Failure { error } => {
                task.status = TaskStatus::Failure;
                task.result_ref = None;
                task.error = Some(error.clone());
            }
        }
        task.updated_at = Utc::now();
        Ok(FinishOutcome::Applied)
    }

    async fn task_statuses(&self, job_id: JobId) -> Result<Vec<TaskStatus>, RepoError> {
        let inner = self.inner.lock().await;
        let ids = inner.job_tasks.get(&job_id).cloned().unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| inner.tasks.get(id).map(|t| t.status))
            .collect())
    }

    async fn compare_and_set_job_status(
        &self,
        job_id: JobId,
        expected: JobStatus,
        next: JobStatus,
    ) -> Result<bool, RepoError> {
        let mut inner = self.inner.lock().await;
        match inner.jobs.get_mut(&job_id) {
            Some(job) if job.status == expected => {
                job.status = next;
                job.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn tasks_page(
        &self,
        job_id: JobId,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Task>, i64), RepoError> {
        let inner = self.inner.lock().await;
        let ids = inner.job_tasks.get(&job_id).cloned().unwrap_or_default();
        let total = ids.len() as i64;
        let offset = offset.max(0) as usize;
        let limit = limit.max(0) as usize;
        let page = ids
            .iter()
            .skip(offset)
            .take(limit)
            .filter_map(|id| inner.tasks.get(id).cloned())
            .collect();
        Ok((page, total))
    }

    async fn stalled_tasks(
        &self,
        cutoff: Timestamp,
        limit: i64,
    ) -> Result<Vec<Task>, RepoError> {
        let inner = self.inner.lock().await;
        let mut stalled: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| !t.status.is_terminal() && t.updated_at < cutoff)
            .cloned()
            .collect();
        stalled.sort_by_key(|t| t.updated_at);
        stalled.truncate(limit.max(0) as usize);
        Ok(stalled)
    }
}

// ---------------------------------------------------------------------------
// Contract tests
// ---------------------------------------------------------------------------
