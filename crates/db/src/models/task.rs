//! Row model for the `tasks` table.

use sqlcheck_core::repo::RepoError;
use sqlcheck_core::task::Task;
use sqlcheck_core::types::{FileRef, Timestamp};
use sqlx::FromRow;
use uuid::Uuid;

use super::status::task_status_from_id;

/// A row from the `tasks` table.
#[derive(Debug, Clone, FromRow)]
pub struct TaskRow {
    pub task_id: Uuid,
    pub job_id: Uuid,
    pub status_id: i16,
    pub file_ref: String,
    pub result_ref: Option<String>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TaskRow {
    pub fn into_domain(self) -> Result<Task, RepoError> {
        let status = task_status_from_id(self.status_id).ok_or_else(|| {
            RepoError::Backend(format!("unknown task status id {}", self.status_id))
        })?;
        Ok(Task {
            task_id: self.task_id,
            job_id: self.job_id,
            status,
            file_ref: FileRef::new(self.file_ref),
            result_ref: self.result_ref.map(FileRef::new),
            error: self.error_message,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
