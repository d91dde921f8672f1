//! Turns a submission into a job plus tasks and publishes one request
//! event per task.
//!
//! Creation transitions are owned here: job insert, task inserts, the
//! `Accepted -> Processing` flip once decomposition succeeded, and the
//! `Accepted -> Failed` shortcut when it did not.

use std::sync::Arc;

use sqlcheck_core::analyze::{Dialect, RuleConfig};
use sqlcheck_core::error::CoreError;
use sqlcheck_core::job::{Job, NewJob};
use sqlcheck_core::repo::{RepoError, Repository};
use sqlcheck_core::retry::with_retry;
use sqlcheck_core::status::SubmissionKind;
use sqlcheck_core::storage::{FileStore, StoreError};
use sqlcheck_core::task::{NewTask, Task};
use sqlcheck_core::types::{CorrelationId, FileRef, JobId};
use sqlcheck_core::EngineConfig;
use sqlcheck_events::bus::{BusError, EventBus, Topic};
use sqlcheck_events::envelope::Envelope;
use sqlcheck_events::messages::{
    BatchFileRequest, BatchMeta, RequestEvent, SingleFileRequest,
};
use uuid::Uuid;

/// A validated submission handed over by the intake front end.
#[derive(Debug, Clone)]
pub enum Submission {
    /// One raw SQL text.
    Single {
        sql_content: String,
        dialect: Dialect,
        rules: RuleConfig,
    },
    /// A pre-expanded list of file references (any archive was already
    /// decompressed upstream). `source_ref` names the upstream archive.
    Batch {
        source_ref: FileRef,
        file_refs: Vec<FileRef>,
        dialect: Dialect,
        rules: RuleConfig,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Decomposes submissions into jobs and tasks.
pub struct Dispatcher {
    repo: Arc<dyn Repository>,
    bus: Arc<dyn EventBus>,
    store: Arc<dyn FileStore>,
    config: EngineConfig,
}

impl Dispatcher {
    pub fn new(
        repo: Arc<dyn Repository>,
        bus: Arc<dyn EventBus>,
        store: Arc<dyn FileStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            repo,
            bus,
            store,
            config,
        }
    }

    /// Insert a job in `Accepted` status.
    ///
    /// Rejects a batch job whose expected count is below one before any
    /// row exists.
    pub async fn create_job(&self, new: NewJob) -> Result<Job, DispatchError> {
        if new.submission_kind == SubmissionKind::Batch
            && new.batch_expected_count.map_or(true, |count| count < 1)
        {
            return Err(CoreError::Validation(
                "a batch job must expect at least one file".to_string(),
            )
            .into());
        }
        let job = self.repo.insert_job(new).await?;
        tracing::info!(
            job_id = %job.job_id,
            kind = %job.submission_kind,
            "Job created",
        );
        Ok(job)
    }

    /// Insert a task in `Pending` status.
    pub async fn create_task(
        &self,
        job_id: JobId,
        file_ref: FileRef,
    ) -> Result<Task, DispatchError> {
        let task = self.repo.insert_task(NewTask::new(job_id, file_ref)).await?;
        tracing::debug!(
            job_id = %job_id,
            task_id = %task.task_id,
            file_ref = %task.file_ref,
            "Task created",
        );
        Ok(task)
    }

    /// Publish the request event for one task. Batch metadata is
    /// attached only for batch-originated tasks.
    pub async fn dispatch(
        &self,
        job: &Job,
        task: &Task,
        rules: &RuleConfig,
        batch: Option<BatchMeta>,
        correlation_id: CorrelationId,
    ) -> Result<(), DispatchError> {
        let request = match batch {
            Some(batch) => RequestEvent::BatchFile(BatchFileRequest {
                job_id: job.job_id,
                task_id: task.task_id,
                file_ref: task.file_ref.clone(),
                dialect: job.dialect,
                rules: rules.clone(),
                batch,
            }),
            None => RequestEvent::SingleFile(SingleFileRequest {
                job_id: job.job_id,
                task_id: task.task_id,
                file_ref: task.file_ref.clone(),
                dialect: job.dialect,
                rules: rules.clone(),
            }),
        };
        let envelope = Envelope::encode(RequestEvent::EVENT_TYPE, correlation_id, &request)
            .map_err(BusError::Codec)?;
        self.bus.publish(Topic::Requests, envelope).await?;
        Ok(())
    }

    /// Drive a submission to the point where every request event is on
    /// the bus (or the job is terminally failed).
    ///
    /// Decomposition failure (a batch whose file references all fail
    /// validation) produces a FAILED job with zero tasks and zero
    /// events; the caller still receives the job id and observes the
    /// failure through the job status.
    pub async fn submit(&self, submission: Submission) -> Result<JobId, DispatchError> {
        let correlation_id = Uuid::new_v4();
        match submission {
            Submission::Single {
                sql_content,
                dialect,
                rules,
            } => {
                self.submit_single(sql_content, dialect, rules, correlation_id)
                    .await
            }
            Submission::Batch {
                source_ref,
                file_refs,
                dialect,
                rules,
            } => {
                self.submit_batch(source_ref, file_refs, dialect, rules, correlation_id)
                    .await
            }
        }
    }

    async fn submit_single(
        &self,
        sql_content: String,
        dialect: Dialect,
        rules: RuleConfig,
        correlation_id: CorrelationId,
    ) -> Result<JobId, DispatchError> {
        if sql_content.trim().is_empty() {
            return Err(CoreError::Validation("sql_content is empty".to_string()).into());
        }

        // Store the raw text under the job's source path before the row
        // exists, so a failed write never leaves a job behind.
        let new = NewJob::single(dialect);
        let source_ref = new.source_ref.clone();
        {
            let store = Arc::clone(&self.store);
            let source_ref = source_ref.clone();
            with_retry(&self.config.retry, move || {
                let store = Arc::clone(&store);
                let source_ref = source_ref.clone();
                let contents = sql_content.clone();
                async move { store.write_text(&source_ref, &contents).await }
            })
            .await?;
        }

        let job = self.create_job(new).await?;
        let task = self.create_task(job.job_id, source_ref).await?;
        self.repo.mark_job_processing(job.job_id).await?;
        self.dispatch(&job, &task, &rules, None, correlation_id)
            .await?;

        tracing::info!(job_id = %job.job_id, "Single submission dispatched");
        Ok(job.job_id)
    }

    async fn submit_batch(
        &self,
        source_ref: FileRef,
        file_refs: Vec<FileRef>,
        dialect: Dialect,
        rules: RuleConfig,
        correlation_id: CorrelationId,
    ) -> Result<JobId, DispatchError> {
        // An empty pre-expanded list is malformed input, rejected
        // before any job row exists.
        if file_refs.is_empty() {
            return Err(
                CoreError::Validation("batch file list is empty".to_string()).into(),
            );
        }

        let expected = file_refs.len() as u32;
        let job = self
            .create_job(NewJob::batch(source_ref, expected, dialect))
            .await?;

        // Decomposition: keep only plausible SQL file references.
        let usable: Vec<FileRef> = file_refs.into_iter().filter(is_sql_ref).collect();
        if usable.is_empty() {
            let reason = "no usable SQL file references in batch";
            self.repo.fail_job(job.job_id, reason).await?;
            tracing::warn!(job_id = %job.job_id, reason, "Batch decomposition failed");
            return Ok(job.job_id);
        }

        let mut tasks = Vec::with_capacity(usable.len());
        for file_ref in usable {
            match self.create_task(job.job_id, file_ref).await {
                Ok(task) => tasks.push(task),
                Err(e) => {
                    // Creation is all-or-nothing: a half-decomposed job
                    // is failed rather than partially dispatched.
                    let reason = format!("task creation failed: {e}");
                    self.repo.fail_job(job.job_id, &reason).await?;
                    tracing::error!(job_id = %job.job_id, error = %e, "Batch decomposition aborted");
                    return Ok(job.job_id);
                }
            }
        }

        self.repo.mark_job_processing(job.job_id).await?;

        let batch_id = Uuid::new_v4();
        let total_files = tasks.len() as u32;
        for (index, task) in tasks.iter().enumerate() {
            let meta = BatchMeta {
                batch_id,
                file_index: index as u32,
                total_files,
            };
            self.dispatch(&job, task, &rules, Some(meta), correlation_id)
                .await?;
        }

        tracing::info!(
            job_id = %job.job_id,
            batch_id = %batch_id,
            total_files,
            "Batch submission dispatched",
        );
        Ok(job.job_id)
    }
}

/// A usable reference is non-blank and names a `.sql` file. Hidden
/// files (e.g. archive junk like `.DS_Store` or `._foo.sql`) are not.
fn is_sql_ref(file_ref: &FileRef) -> bool {
    let name = file_ref.file_name();
    if name.is_empty() || name.starts_with('.') || name.starts_with("._") {
        return false;
    }
    name.to_ascii_lowercase().ends_with(".sql")
}
