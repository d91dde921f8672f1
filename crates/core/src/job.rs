//! The Job entity: the top-level submitted unit of work.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analyze::Dialect;
use crate::status::{JobStatus, SubmissionKind};
use crate::storage;
use crate::types::{FileRef, JobId, Timestamp};

/// A submitted unit of work: one SQL text, or one batch of files.
///
/// Created once by the dispatcher; mutated only by the dispatcher
/// (decomposition failure) and the aggregator (status roll-up).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub status: JobStatus,
    pub submission_kind: SubmissionKind,
    pub source_ref: FileRef,
    /// Fixed at creation for batch jobs; `None` for single submissions.
    pub batch_expected_count: Option<u32>,
    pub dialect: Dialect,
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Insert payload for a new job. Ids are generated here so source
/// content can be stored under the job's path before the row exists.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_id: JobId,
    pub submission_kind: SubmissionKind,
    pub source_ref: FileRef,
    pub batch_expected_count: Option<u32>,
    pub dialect: Dialect,
}

impl NewJob {
    /// A single-SQL submission. The source reference points at the
    /// job-scoped path the dispatcher stores the raw text under.
    pub fn single(dialect: Dialect) -> Self {
        let job_id = Uuid::now_v7();
        Self {
            job_id,
            submission_kind: SubmissionKind::Single,
            source_ref: storage::single_source_ref(job_id),
            batch_expected_count: None,
            dialect,
        }
    }

    /// A batch submission over a pre-expanded file list.
    pub fn batch(source_ref: FileRef, expected_count: u32, dialect: Dialect) -> Self {
        Self {
            job_id: Uuid::now_v7(),
            submission_kind: SubmissionKind::Batch,
            source_ref,
            batch_expected_count: Some(expected_count),
            dialect,
        }
    }
}
