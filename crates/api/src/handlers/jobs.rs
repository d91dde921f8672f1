//! Handlers for the `/jobs` resource.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use sqlcheck_core::analyze::{Dialect, RuleConfig};
use sqlcheck_core::error::CoreError;
use sqlcheck_core::job::Job;
use sqlcheck_core::status::{JobStatus, SubmissionKind, TaskStatus};
use sqlcheck_core::task::Task;
use sqlcheck_core::types::{FileRef, JobId, TaskId, Timestamp};
use sqlcheck_pipeline::Submission;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::query::PaginationParams;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request/response shapes
// ---------------------------------------------------------------------------

/// Body for `POST /api/v1/jobs`.
///
/// Exactly one of `sql_content` (single submission) or `file_refs`
/// (batch submission, pre-expanded upstream) must be present. Batch
/// submissions also name the upstream archive via `archive_ref`.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitJobRequest {
    #[validate(length(min = 1, max = 1048576))]
    pub sql_content: Option<String>,

    pub archive_ref: Option<String>,

    #[validate(length(max = 10000))]
    pub file_refs: Option<Vec<String>>,

    pub dialect: Option<String>,

    #[serde(default)]
    pub rules: Vec<String>,

    #[serde(default)]
    pub exclude_rules: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitJobResponse {
    pub job_id: JobId,
}

/// Task summary embedded in the job view.
#[derive(Debug, Serialize)]
pub struct TaskSummary {
    pub task_id: TaskId,
    pub file_name: String,
    pub status: TaskStatus,
    pub result_ref: Option<FileRef>,
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<Task> for TaskSummary {
    fn from(task: Task) -> Self {
        Self {
            task_id: task.task_id,
            file_name: task.file_ref.file_name().to_string(),
            status: task.status,
            result_ref: task.result_ref,
            error: task.error,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TaskPage {
    pub items: Vec<TaskSummary>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Job view with one page of task summaries.
#[derive(Debug, Serialize)]
pub struct JobDetail {
    pub job_id: JobId,
    pub status: JobStatus,
    pub submission_kind: SubmissionKind,
    pub source_ref: FileRef,
    pub batch_expected_count: Option<u32>,
    pub dialect: Dialect,
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub tasks: TaskPage,
}

impl JobDetail {
    fn new(job: Job, tasks: TaskPage) -> Self {
        Self {
            job_id: job.job_id,
            status: job.status,
            submission_kind: job.submission_kind,
            source_ref: job.source_ref,
            batch_expected_count: job.batch_expected_count,
            dialect: job.dialect,
            error: job.error,
            created_at: job.created_at,
            updated_at: job.updated_at,
            tasks,
        }
    }
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Accept a validated submission and hand it to the dispatcher.
/// Returns 201 with the new job id; the submitter observes progress and
/// the terminal outcome through `GET /jobs/{id}`.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(input): Json<SubmitJobRequest>,
) -> ApiResult<impl IntoResponse> {
    input
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let dialect = match &input.dialect {
        Some(name) => name.parse::<Dialect>()?,
        None => state.config.engine.default_dialect,
    };
    let rules = RuleConfig {
        rules: input.rules,
        exclude_rules: input.exclude_rules,
        config_overrides: Default::default(),
    };

    let submission = match (input.sql_content, input.file_refs) {
        (Some(sql_content), None) => Submission::Single {
            sql_content,
            dialect,
            rules,
        },
        (None, Some(file_refs)) => {
            let archive_ref = input.archive_ref.ok_or_else(|| {
                ApiError::BadRequest("archive_ref is required for batch submissions".into())
            })?;
            Submission::Batch {
                source_ref: FileRef::new(archive_ref),
                file_refs: file_refs.into_iter().map(FileRef::new).collect(),
                dialect,
                rules,
            }
        }
        _ => {
            return Err(ApiError::BadRequest(
                "provide exactly one of sql_content or file_refs".into(),
            ))
        }
    };

    let job_id = state.dispatcher.submit(submission).await?;

    tracing::info!(job_id = %job_id, "Job submitted");
    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: SubmitJobResponse { job_id },
        }),
    ))
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
///
/// Job view with paginated task summaries (`?limit=&offset=`).
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Query(params): Query<PaginationParams>,
) -> ApiResult<impl IntoResponse> {
    let job = state
        .repo
        .job_by_id(job_id)
        .await?
        .ok_or(ApiError::Core(CoreError::NotFound {
            entity: "Job",
            id: job_id,
        }))?;

    let (limit, offset) = params.clamp();
    let (tasks, total) = state.repo.tasks_page(job_id, limit, offset).await?;
    let page = TaskPage {
        items: tasks.into_iter().map(TaskSummary::from).collect(),
        total,
        limit,
        offset,
    };

    Ok(Json(DataResponse {
        data: JobDetail::new(job, page),
    }))
}
