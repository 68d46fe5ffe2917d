//! Postgres-backed [`PipelineStore`] over the repository layer.

use async_trait::async_trait;

use modella_core::step::StepKind;
use modella_core::types::DbId;
use modella_db::models::asset::{Asset, NewResultAsset};
use modella_db::models::project::Project;
use modella_db::models::status::ProjectStatus;
use modella_db::models::task::{NewTask, Task};
use modella_db::repositories::{AssetRepo, ProjectRepo, TaskRepo};
use modella_db::DbPool;
use modella_runninghub::response::TaskUsage;

use crate::store::{PipelineStore, StoreError};

/// [`PipelineStore`] implementation delegating to the repositories.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PipelineStore for PgStore {
    async fn load_project(&self, id: DbId) -> Result<Option<Project>, StoreError> {
        Ok(ProjectRepo::find_by_id(&self.pool, id).await?)
    }

    async fn try_activate_run(
        &self,
        id: DbId,
        start_step: StepKind,
        chain: bool,
    ) -> Result<Option<Project>, StoreError> {
        Ok(ProjectRepo::try_activate_pipeline(&self.pool, id, start_step, chain).await?)
    }

    async fn request_cancel(&self, id: DbId) -> Result<Option<Project>, StoreError> {
        Ok(ProjectRepo::request_pipeline_cancel(&self.pool, id).await?)
    }

    async fn set_current_step(&self, id: DbId, step: Option<StepKind>) -> Result<(), StoreError> {
        Ok(ProjectRepo::set_pipeline_step(&self.pool, id, step).await?)
    }

    async fn finish_run(
        &self,
        id: DbId,
        status: ProjectStatus,
        last_error: Option<&str>,
    ) -> Result<(), StoreError> {
        Ok(ProjectRepo::finish_pipeline(&self.pool, id, status, last_error).await?)
    }

    async fn record_step_result(
        &self,
        project_id: DbId,
        step: StepKind,
        asset_id: DbId,
    ) -> Result<(), StoreError> {
        Ok(ProjectRepo::record_step_result(&self.pool, project_id, step, asset_id).await?)
    }

    async fn active_task_count(&self, project_id: DbId) -> Result<i64, StoreError> {
        Ok(TaskRepo::active_count_for_project(&self.pool, project_id).await?)
    }

    async fn load_asset(&self, id: DbId) -> Result<Option<Asset>, StoreError> {
        Ok(AssetRepo::find_by_id(&self.pool, id).await?)
    }

    async fn create_result_asset(&self, asset: NewResultAsset) -> Result<Asset, StoreError> {
        Ok(AssetRepo::create_result(&self.pool, &asset).await?)
    }

    async fn create_task(&self, task: NewTask) -> Result<Task, StoreError> {
        Ok(TaskRepo::create(&self.pool, &task).await?)
    }

    async fn load_task(&self, id: DbId) -> Result<Option<Task>, StoreError> {
        Ok(TaskRepo::find_by_id(&self.pool, id).await?)
    }

    async fn find_task_by_remote_id(
        &self,
        remote_task_id: &str,
    ) -> Result<Option<Task>, StoreError> {
        Ok(TaskRepo::find_by_remote_id(&self.pool, remote_task_id).await?)
    }

    async fn begin_task(&self, id: DbId) -> Result<(), StoreError> {
        Ok(TaskRepo::begin(&self.pool, id).await?)
    }

    async fn mark_task_running(
        &self,
        id: DbId,
        remote_task_id: &str,
        remote_client_id: Option<&str>,
    ) -> Result<(), StoreError> {
        Ok(TaskRepo::mark_running(&self.pool, id, remote_task_id, remote_client_id).await?)
    }

    async fn update_task_progress(&self, id: DbId, percent: i16) -> Result<(), StoreError> {
        Ok(TaskRepo::update_progress(&self.pool, id, percent).await?)
    }

    async fn complete_task(
        &self,
        id: DbId,
        result_url: Option<&str>,
        result_asset_id: Option<DbId>,
    ) -> Result<(), StoreError> {
        Ok(TaskRepo::complete(&self.pool, id, result_url, result_asset_id).await?)
    }

    async fn fail_task(&self, id: DbId, error: &str) -> Result<(), StoreError> {
        Ok(TaskRepo::fail(&self.pool, id, error).await?)
    }

    async fn update_task_usage(&self, id: DbId, usage: &TaskUsage) -> Result<(), StoreError> {
        Ok(TaskRepo::update_usage(
            &self.pool,
            id,
            usage.cost_time_secs.map(|v| v as i32),
            usage.consume_money,
            usage.consume_coins.map(|v| v as i32),
            usage.third_party_cost,
        )
        .await?)
    }
}
