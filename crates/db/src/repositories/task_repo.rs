//! Repository for the `tasks` table.

use sqlcheck_core::task::NewTask;
use sqlcheck_core::types::Timestamp;
use sqlcheck_core::status::TaskStatus;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::status::{task_status_id, StatusId, TERMINAL_TASK_STATUSES};
use crate::models::task::TaskRow;

/// Column list for `tasks` queries.
const COLUMNS: &str = "\
    task_id, job_id, status_id, file_ref, result_ref, error_message, \
    created_at, updated_at";

/// Provides CRUD and transition operations for tasks.
pub struct TaskRepo;

impl TaskRepo {
    /// Insert a new task in `Pending` status.
    pub async fn insert(pool: &PgPool, new: &NewTask) -> Result<TaskRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO tasks (task_id, job_id, status_id, file_ref) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TaskRow>(&query)
            .bind(new.task_id)
            .bind(new.job_id)
            .bind(task_status_id(TaskStatus::Pending))
            .bind(new.file_ref.as_str())
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, task_id: Uuid) -> Result<Option<TaskRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE task_id = $1");
        sqlx::query_as::<_, TaskRow>(&query)
            .bind(task_id)
            .fetch_optional(pool)
            .await
    }

    /// `Pending -> InProgress`, also matching tasks already
    /// `InProgress` so a new lock owner can resume a crashed one's
    /// work. Returns `false` for terminal tasks.
    pub async fn start(pool: &PgPool, task_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks SET status_id = $2, updated_at = NOW() \
             WHERE task_id = $1 AND status_id IN ($3, $4)",
        )
        .bind(task_id)
        .bind(task_status_id(TaskStatus::InProgress))
        .bind(task_status_id(TaskStatus::Pending))
        .bind(task_status_id(TaskStatus::InProgress))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Guarded terminal write; applies only while the task is
    /// non-terminal. Returns the number of affected rows (0 or 1).
    pub async fn finish(
        pool: &PgPool,
        task_id: Uuid,
        status: TaskStatus,
        result_ref: Option<&str>,
        error: Option<&str>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks \
             SET status_id = $2, result_ref = $3, error_message = $4, updated_at = NOW() \
             WHERE task_id = $1 AND status_id NOT IN ($5, $6)",
        )
        .bind(task_id)
        .bind(task_status_id(status))
        .bind(result_ref)
        .bind(error)
        .bind(TERMINAL_TASK_STATUSES[0])
        .bind(TERMINAL_TASK_STATUSES[1])
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Current status id, or `None` for an unknown task.
    pub async fn status_of(pool: &PgPool, task_id: Uuid) -> Result<Option<StatusId>, sqlx::Error> {
        sqlx::query_scalar::<_, StatusId>("SELECT status_id FROM tasks WHERE task_id = $1")
            .bind(task_id)
            .fetch_optional(pool)
            .await
    }

    /// Status ids of every task belonging to a job.
    pub async fn statuses_for_job(
        pool: &PgPool,
        job_id: Uuid,
    ) -> Result<Vec<StatusId>, sqlx::Error> {
        sqlx::query_scalar::<_, StatusId>("SELECT status_id FROM tasks WHERE job_id = $1")
            .bind(job_id)
            .fetch_all(pool)
            .await
    }

    /// One page of a job's tasks in creation order, plus the total.
    pub async fn page_for_job(
        pool: &PgPool,
        job_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<TaskRow>, i64), sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tasks WHERE job_id = $1 \
             ORDER BY created_at ASC, task_id ASC \
             LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, TaskRow>(&query)
            .bind(job_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?;
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tasks WHERE job_id = $1")
            .bind(job_id)
            .fetch_one(pool)
            .await?;
        Ok((rows, total))
    }

    /// Non-terminal tasks whose last update is older than `cutoff`.
    pub async fn stalled(
        pool: &PgPool,
        cutoff: Timestamp,
        limit: i64,
    ) -> Result<Vec<TaskRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             WHERE status_id IN ($1, $2) AND updated_at < $3 \
             ORDER BY updated_at ASC \
             LIMIT $4"
        );
        sqlx::query_as::<_, TaskRow>(&query)
            .bind(task_status_id(TaskStatus::Pending))
            .bind(task_status_id(TaskStatus::InProgress))
            .bind(cutoff)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}
