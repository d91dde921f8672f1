//! Repository for the `jobs` table.
//!
//! Every transition is a guarded UPDATE: the WHERE clause encodes the
//! legal source statuses, so concurrent writers can never regress a
//! terminal row. No magic numbers: status literals go through the
//! mappings in `models::status`.

use sqlcheck_core::job::NewJob;
use sqlcheck_core::status::JobStatus;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::job::JobRow;
use crate::models::status::{job_status_id, submission_kind_id, TERMINAL_JOB_STATUSES};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    job_id, status_id, kind_id, source_ref, batch_expected_count, \
    dialect, error_message, created_at, updated_at";

/// Provides CRUD and transition operations for jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new job in `Accepted` status.
    pub async fn insert(pool: &PgPool, new: &NewJob) -> Result<JobRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs \
                 (job_id, status_id, kind_id, source_ref, batch_expected_count, dialect) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(new.job_id)
            .bind(job_status_id(JobStatus::Accepted))
            .bind(submission_kind_id(new.submission_kind))
            .bind(new.source_ref.as_str())
            .bind(new.batch_expected_count.map(|c| c as i32))
            .bind(new.dialect.as_str())
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, job_id: Uuid) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE job_id = $1");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(job_id)
            .fetch_optional(pool)
            .await
    }

    /// `Accepted -> Processing`. Returns `false` if the job was in any
    /// other status.
    pub async fn mark_processing(pool: &PgPool, job_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET status_id = $2, updated_at = NOW() \
             WHERE job_id = $1 AND status_id = $3",
        )
        .bind(job_id)
        .bind(job_status_id(JobStatus::Processing))
        .bind(job_status_id(JobStatus::Accepted))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Job-level failure: any non-terminal status to `Failed` with the
    /// error recorded. Returns `false` for already-terminal jobs.
    pub async fn fail(pool: &PgPool, job_id: Uuid, error: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, error_message = $3, updated_at = NOW() \
             WHERE job_id = $1 AND status_id NOT IN ($4, $5, $6)",
        )
        .bind(job_id)
        .bind(job_status_id(JobStatus::Failed))
        .bind(error)
        .bind(TERMINAL_JOB_STATUSES[0])
        .bind(TERMINAL_JOB_STATUSES[1])
        .bind(TERMINAL_JOB_STATUSES[2])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Atomic compare-and-set on the status column.
    pub async fn compare_and_set_status(
        pool: &PgPool,
        job_id: Uuid,
        expected: JobStatus,
        next: JobStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET status_id = $2, updated_at = NOW() \
             WHERE job_id = $1 AND status_id = $3",
        )
        .bind(job_id)
        .bind(job_status_id(next))
        .bind(job_status_id(expected))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
