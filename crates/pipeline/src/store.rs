//! Persistence boundary for pipeline execution.
//!
//! The synchronous request path and the detached step loop load the
//! same rows independently; every mutation goes through this trait so
//! neither side ever acts on a shared in-memory snapshot. The Postgres
//! implementation lives in [`crate::pg`].

use async_trait::async_trait;

use modella_core::step::StepKind;
use modella_core::types::DbId;
use modella_db::models::asset::{Asset, NewResultAsset};
use modella_db::models::project::Project;
use modella_db::models::status::ProjectStatus;
use modella_db::models::task::{NewTask, Task};
use modella_runninghub::response::TaskUsage;

/// Error from the persistence layer, already flattened to a message.
#[derive(Debug, thiserror::Error)]
#[error("storage error: {0}")]
pub struct StoreError(pub String);

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError(err.to_string())
    }
}

/// Everything pipeline execution persists or reloads.
#[async_trait]
pub trait PipelineStore: Send + Sync {
    // ---- projects ----

    async fn load_project(&self, id: DbId) -> Result<Option<Project>, StoreError>;

    /// Atomically claim the project's pipeline run. `None` means a run
    /// is already active.
    async fn try_activate_run(
        &self,
        id: DbId,
        start_step: StepKind,
        chain: bool,
    ) -> Result<Option<Project>, StoreError>;

    /// Raise the cancel flag on an active run. `None` means no run was
    /// active.
    async fn request_cancel(&self, id: DbId) -> Result<Option<Project>, StoreError>;

    async fn set_current_step(&self, id: DbId, step: Option<StepKind>) -> Result<(), StoreError>;

    async fn finish_run(
        &self,
        id: DbId,
        status: ProjectStatus,
        last_error: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn record_step_result(
        &self,
        project_id: DbId,
        step: StepKind,
        asset_id: DbId,
    ) -> Result<(), StoreError>;

    /// Queued/running task count, the advisory pre-start guard.
    async fn active_task_count(&self, project_id: DbId) -> Result<i64, StoreError>;

    // ---- assets ----

    async fn load_asset(&self, id: DbId) -> Result<Option<Asset>, StoreError>;

    async fn create_result_asset(&self, asset: NewResultAsset) -> Result<Asset, StoreError>;

    // ---- tasks ----

    async fn create_task(&self, task: NewTask) -> Result<Task, StoreError>;

    async fn load_task(&self, id: DbId) -> Result<Option<Task>, StoreError>;

    async fn find_task_by_remote_id(
        &self,
        remote_task_id: &str,
    ) -> Result<Option<Task>, StoreError>;

    async fn begin_task(&self, id: DbId) -> Result<(), StoreError>;

    async fn mark_task_running(
        &self,
        id: DbId,
        remote_task_id: &str,
        remote_client_id: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn update_task_progress(&self, id: DbId, percent: i16) -> Result<(), StoreError>;

    async fn complete_task(
        &self,
        id: DbId,
        result_url: Option<&str>,
        result_asset_id: Option<DbId>,
    ) -> Result<(), StoreError>;

    async fn fail_task(&self, id: DbId, error: &str) -> Result<(), StoreError>;

    async fn update_task_usage(&self, id: DbId, usage: &TaskUsage) -> Result<(), StoreError>;
}
