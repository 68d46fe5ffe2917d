//! Handlers for the pipeline run surface.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use modella_core::step::StepKind;
use modella_core::types::{DbId, Timestamp};
use modella_db::models::project::Project;
use modella_db::models::status::ProjectStatus;
use modella_db::repositories::ProjectRepo;
use modella_pipeline::StartOptions;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST .../pipeline/start`. Both fields optional;
/// an empty object starts the full chain at the first enabled step.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StartPipelineRequest {
    pub start_step: Option<String>,
    pub chain: Option<bool>,
}

/// Pipeline run state as exposed to clients.
#[derive(Debug, Serialize)]
pub struct PipelineState {
    pub project_id: DbId,
    pub status: &'static str,
    pub active: bool,
    pub cancel_requested: bool,
    pub chain: bool,
    pub start_step: Option<String>,
    pub current_step: Option<String>,
    pub last_error: Option<String>,
    pub started_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
    /// Effective ordered list of enabled steps.
    pub step_order: Vec<&'static str>,
}

impl PipelineState {
    pub fn from_project(project: &Project) -> Self {
        Self {
            project_id: project.id,
            status: ProjectStatus::from_id(project.status_id)
                .map(ProjectStatus::name)
                .unwrap_or("unknown"),
            active: project.pipeline_active,
            cancel_requested: project.pipeline_cancel_requested,
            chain: project.pipeline_chain,
            start_step: project.pipeline_start_step.clone(),
            current_step: project.pipeline_current_step.clone(),
            last_error: project.pipeline_last_error.clone(),
            started_at: project.pipeline_started_at,
            updated_at: project.pipeline_updated_at,
            step_order: project
                .workflow_config()
                .ordered_steps()
                .into_iter()
                .map(StepKind::as_str)
                .collect(),
        }
    }
}

/// POST /api/v1/projects/{id}/pipeline/start
///
/// Validates synchronously and returns 202 once the run state is
/// persisted; execution continues in the background. Execution-time
/// errors surface later through the persisted state.
pub async fn start_pipeline(
    State(state): State<AppState>,
    Path(project_id): Path<DbId>,
    Json(request): Json<StartPipelineRequest>,
) -> AppResult<impl IntoResponse> {
    let start_step = match &request.start_step {
        Some(raw) => Some(
            StepKind::parse(raw)
                .ok_or_else(|| AppError::BadRequest(format!("unknown step '{raw}'")))?,
        ),
        None => None,
    };

    let project = state
        .controller
        .start(
            project_id,
            StartOptions {
                start_step,
                chain: request.chain.unwrap_or(true),
            },
        )
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: PipelineState::from_project(&project),
        }),
    ))
}

/// POST /api/v1/projects/{id}/pipeline/cancel
///
/// Requests cooperative cancellation: the in-flight step finishes, the
/// next one never starts.
pub async fn cancel_pipeline(
    State(state): State<AppState>,
    Path(project_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let project = state.controller.cancel(project_id).await?;
    Ok(Json(DataResponse {
        data: PipelineState::from_project(&project),
    }))
}

/// GET /api/v1/projects/{id}/pipeline
pub async fn pipeline_state(
    State(state): State<AppState>,
    Path(project_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let project = ProjectRepo::find_by_id(&state.pool, project_id)
        .await?
        .ok_or(AppError::Core(modella_core::error::CoreError::NotFound {
            entity: "Project",
            id: project_id,
        }))?;
    Ok(Json(DataResponse {
        data: PipelineState::from_project(&project),
    }))
}
