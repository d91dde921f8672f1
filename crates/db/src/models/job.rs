//! Row model for the `jobs` table.

use sqlcheck_core::job::Job;
use sqlcheck_core::repo::RepoError;
use sqlcheck_core::types::{FileRef, Timestamp};
use sqlx::FromRow;
use uuid::Uuid;

use super::status::{job_status_from_id, submission_kind_from_id};

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub job_id: Uuid,
    pub status_id: i16,
    pub kind_id: i16,
    pub source_ref: String,
    pub batch_expected_count: Option<i32>,
    pub dialect: String,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl JobRow {
    /// Convert to the domain entity, rejecting ids or dialects outside
    /// the known sets (which would mean a schema/seed mismatch).
    pub fn into_domain(self) -> Result<Job, RepoError> {
        let status = job_status_from_id(self.status_id).ok_or_else(|| {
            RepoError::Backend(format!("unknown job status id {}", self.status_id))
        })?;
        let submission_kind = submission_kind_from_id(self.kind_id).ok_or_else(|| {
            RepoError::Backend(format!("unknown submission kind id {}", self.kind_id))
        })?;
        let dialect = self
            .dialect
            .parse()
            .map_err(|_| RepoError::Backend(format!("unknown dialect {:?}", self.dialect)))?;
        Ok(Job {
            job_id: self.job_id,
            status,
            submission_kind,
            source_ref: FileRef::new(self.source_ref),
            batch_expected_count: self.batch_expected_count.map(|c| c as u32),
            dialect,
            error: self.error_message,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
