//! The Task entity: the per-file unit of execution within a Job.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::TaskStatus;
use crate::types::{FileRef, JobId, TaskId, Timestamp};

/// One per-file execution unit. Belongs to exactly one job.
///
/// Created once by the dispatcher; execution transitions are owned by
/// the worker holding the task lock; read by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub job_id: JobId,
    pub status: TaskStatus,
    pub file_ref: FileRef,
    pub result_ref: Option<FileRef>,
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Task {
    /// Reconstruct the terminal outcome from a finished task's fields.
    ///
    /// `None` for non-terminal tasks, and for the (defensive) case of a
    /// SUCCESS row missing its result reference.
    pub fn terminal_outcome(&self) -> Option<TaskOutcome> {
        match self.status {
            TaskStatus::Success => self
                .result_ref
                .clone()
                .map(|result_ref| TaskOutcome::Success { result_ref }),
            TaskStatus::Failure => Some(TaskOutcome::Failure {
                error: self
                    .error
                    .clone()
                    .unwrap_or_else(|| "unknown failure".to_string()),
            }),
            _ => None,
        }
    }
}

/// Insert payload for a new task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub task_id: TaskId,
    pub job_id: JobId,
    pub file_ref: FileRef,
}

impl NewTask {
    pub fn new(job_id: JobId, file_ref: FileRef) -> Self {
        Self {
            task_id: Uuid::now_v7(),
            job_id,
            file_ref,
        }
    }
}

/// The terminal outcome of one task execution.
///
/// Serializes with a `status` tag so completion payloads read
/// `{"status":"SUCCESS","result_ref":...}` / `{"status":"FAILURE","error":...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum TaskOutcome {
    #[serde(rename = "SUCCESS")]
    Success { result_ref: FileRef },
    #[serde(rename = "FAILURE")]
    Failure { error: String },
}

impl TaskOutcome {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskOutcome::Success { .. } => TaskStatus::Success,
            TaskOutcome::Failure { .. } => TaskStatus::Failure,
        }
    }
}
