//! Handlers for task visibility (listing and status polling).

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use modella_core::error::CoreError;
use modella_core::types::DbId;
use modella_db::models::status::TaskStatus;
use modella_db::models::task::Task;
use modella_db::repositories::{ProjectRepo, TaskRepo};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Assumed elapsed seconds when estimating remaining time from a
/// progress fraction.
const ASSUMED_ELAPSED_SECS: i64 = 30;

/// Fallback estimate when a running task reports no progress yet.
const DEFAULT_ESTIMATE_SECS: i64 = 60;

/// Query parameters for task listing.
#[derive(Debug, Deserialize)]
pub struct TaskListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /api/v1/projects/{id}/tasks
pub async fn list_project_tasks(
    State(state): State<AppState>,
    Path(project_id): Path<DbId>,
    Query(query): Query<TaskListQuery>,
) -> AppResult<impl IntoResponse> {
    ProjectRepo::find_by_id(&state.pool, project_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Project",
            id: project_id,
        }))?;

    let tasks =
        TaskRepo::list_by_project(&state.pool, project_id, query.limit, query.offset).await?;
    Ok(Json(DataResponse { data: tasks }))
}

/// GET /api/v1/tasks/{id}
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let task = find_task(&state, task_id).await?;
    Ok(Json(DataResponse { data: task }))
}

/// Task status body for client polling.
#[derive(Debug, Serialize)]
pub struct TaskStatusBody {
    pub id: DbId,
    pub status: &'static str,
    pub progress_percent: i16,
    pub result_url: Option<String>,
    pub error_message: Option<String>,
    /// Coarse estimate; `None` once the task is terminal.
    pub estimated_seconds_remaining: Option<i64>,
}

/// GET /api/v1/tasks/{id}/status
pub async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let task = find_task(&state, task_id).await?;

    let estimated = match task.status() {
        Some(TaskStatus::Running) => Some(estimate_remaining(task.progress_percent)),
        Some(TaskStatus::Pending) | Some(TaskStatus::Queued) => Some(DEFAULT_ESTIMATE_SECS),
        _ => None,
    };

    Ok(Json(DataResponse {
        data: TaskStatusBody {
            id: task.id,
            status: task.status().map(TaskStatus::name).unwrap_or("unknown"),
            progress_percent: task.progress_percent,
            result_url: task.result_url.clone(),
            error_message: task.error_message.clone(),
            estimated_seconds_remaining: estimated,
        },
    }))
}

async fn find_task(state: &AppState, task_id: DbId) -> AppResult<Task> {
    TaskRepo::find_by_id(&state.pool, task_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Task",
            id: task_id,
        }))
}

/// Remaining-time estimate from the current progress fraction.
fn estimate_remaining(progress_percent: i16) -> i64 {
    if progress_percent > 0 {
        let progress = progress_percent as i64;
        (100 - progress) * ASSUMED_ELAPSED_SECS / progress
    } else {
        DEFAULT_ESTIMATE_SECS
    }
}
