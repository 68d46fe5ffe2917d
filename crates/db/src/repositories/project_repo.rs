//! Repository for the `projects` table.
//!
//! Pipeline run-state transitions live here. Activation is a single
//! conditional UPDATE so two near-simultaneous start calls cannot both
//! claim the run; the loser sees zero rows returned.

use sqlx::PgPool;

use modella_core::step::StepKind;
use modella_core::types::DbId;

use crate::models::project::Project;
use crate::models::status::ProjectStatus;

/// Column list for `projects` queries.
const COLUMNS: &str = "\
    id, user_id, name, status_id, \
    enable_try_on, enable_background, enable_video, step_order, \
    try_on_person_source, background_person_source, video_person_source, \
    model_image_id, clothing_image_id, background_image_id, reference_video_id, \
    video_skip_seconds, video_duration, video_fps, video_width, video_height, \
    try_on_result_id, background_result_id, video_result_id, \
    pipeline_active, pipeline_cancel_requested, pipeline_chain, \
    pipeline_start_step, pipeline_current_step, pipeline_last_error, \
    pipeline_started_at, pipeline_updated_at, \
    created_at, updated_at";

/// Provides pipeline-oriented operations on projects. Project CRUD is
/// owned by the surrounding application.
pub struct ProjectRepo;

impl ProjectRepo {
    /// Find a project by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Project>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM projects WHERE id = $1");
        sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Atomically claim the project's pipeline run.
    ///
    /// Succeeds only when no run is active: the `pipeline_active = FALSE`
    /// predicate and the flag flip happen in one statement. Returns the
    /// updated row, or `None` when another run already holds the flag.
    pub async fn try_activate_pipeline(
        pool: &PgPool,
        id: DbId,
        start_step: StepKind,
        chain: bool,
    ) -> Result<Option<Project>, sqlx::Error> {
        let query = format!(
            "UPDATE projects \
             SET pipeline_active = TRUE, \
                 pipeline_cancel_requested = FALSE, \
                 pipeline_chain = $2, \
                 pipeline_start_step = $3, \
                 pipeline_current_step = NULL, \
                 pipeline_last_error = NULL, \
                 pipeline_started_at = NOW(), \
                 pipeline_updated_at = NOW(), \
                 status_id = $4, \
                 updated_at = NOW() \
             WHERE id = $1 AND pipeline_active = FALSE \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .bind(chain)
            .bind(start_step.as_str())
            .bind(ProjectStatus::Processing.id())
            .fetch_optional(pool)
            .await
    }

    /// Request cancellation of the active run.
    ///
    /// The flag may only rise while a run is active; the predicate makes
    /// the call a no-op otherwise. Returns the updated row, or `None`
    /// when no run was active.
    pub async fn request_pipeline_cancel(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<Project>, sqlx::Error> {
        let query = format!(
            "UPDATE projects \
             SET pipeline_cancel_requested = TRUE, \
                 pipeline_updated_at = NOW(), \
                 updated_at = NOW() \
             WHERE id = $1 AND pipeline_active = TRUE \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Record which step the background loop is about to execute.
    pub async fn set_pipeline_step(
        pool: &PgPool,
        id: DbId,
        step: Option<StepKind>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE projects \
             SET pipeline_current_step = $2, pipeline_updated_at = NOW(), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(step.map(StepKind::as_str))
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Close the active run: clear the active flag and current step,
    /// reset the cancel flag, and record the terminal status and error.
    pub async fn finish_pipeline(
        pool: &PgPool,
        id: DbId,
        status: ProjectStatus,
        last_error: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE projects \
             SET pipeline_active = FALSE, \
                 pipeline_cancel_requested = FALSE, \
                 pipeline_current_step = NULL, \
                 pipeline_last_error = $3, \
                 pipeline_updated_at = NOW(), \
                 status_id = $2, \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.id())
        .bind(last_error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Point the project's per-step result reference at a new artifact.
    pub async fn record_step_result(
        pool: &PgPool,
        id: DbId,
        step: StepKind,
        asset_id: DbId,
    ) -> Result<(), sqlx::Error> {
        let column = match step {
            StepKind::TryOn => "try_on_result_id",
            StepKind::Background => "background_result_id",
            StepKind::Video => "video_result_id",
        };
        let query =
            format!("UPDATE projects SET {column} = $2, updated_at = NOW() WHERE id = $1");
        sqlx::query(&query).bind(id).bind(asset_id).execute(pool).await?;
        Ok(())
    }
}
