//! Handlers for the `/tasks` resource.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use sqlcheck_core::error::CoreError;
use sqlcheck_core::status::TaskStatus;
use sqlcheck_core::types::{FileRef, TaskId};

use crate::error::{ApiError, ApiResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Result view for a terminal task: the result reference for SUCCESS,
/// the captured error for FAILURE.
#[derive(Debug, Serialize)]
pub struct TaskResultResponse {
    pub task_id: TaskId,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<FileRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /api/v1/tasks/{id}/result
///
/// Returns the task's result reference once it is terminal; 409 while
/// the task is still pending or running, 404 for unknown ids.
pub async fn get_task_result(
    State(state): State<AppState>,
    Path(task_id): Path<TaskId>,
) -> ApiResult<impl IntoResponse> {
    let task = state
        .repo
        .task_by_id(task_id)
        .await?
        .ok_or(ApiError::Core(CoreError::NotFound {
            entity: "Task",
            id: task_id,
        }))?;

    if !task.status.is_terminal() {
        return Err(ApiError::Conflict(format!(
            "task {task_id} has not reached a terminal status (currently {})",
            task.status
        )));
    }

    Ok(Json(DataResponse {
        data: TaskResultResponse {
            task_id: task.task_id,
            status: task.status,
            result_ref: task.result_ref,
            error: task.error,
        },
    }))
}
