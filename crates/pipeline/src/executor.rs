//! Drives one prepared step through the remote job lifecycle.
//!
//! Upload inputs, submit, poll to a terminal status, then register the
//! result artifact and usage on success. The task row mirrors every
//! transition (Pending -> Queued -> Running -> terminal) so the
//! lifecycle is observable while the loop runs.

use std::sync::Arc;

use async_trait::async_trait;

use modella_core::step::StepKind;
use modella_core::types::DbId;
use modella_db::models::asset::{Asset, NewResultAsset};
use modella_db::models::project::Project;
use modella_db::models::task::NewTask;
use modella_runninghub::apps::JobParams;
use modella_runninghub::client::{JobApi, RunningHubConfig, RunningHubError};
use modella_runninghub::poller::{
    wait_for_completion, PollConfig, PollObserver, PollOutcome,
};
use modella_runninghub::response::{NormalizedStatus, RemoteStatus};

use crate::artifacts;
use crate::fetch::{AssetFetcher, FetchError};
use crate::runners::StepPlan;
use crate::store::{PipelineStore, StoreError};

/// Diagnostic recorded on a task whose polling deadline passed.
pub const TIMED_OUT_MESSAGE: &str = "Task processing timed out";

#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error("failed to upload {param} to RunningHub")]
    UploadRejected { param: &'static str },

    #[error("task submission rejected: {0}")]
    SubmissionRejected(String),

    #[error("remote task failed: {0}")]
    RemoteFailed(String),

    #[error("{}", TIMED_OUT_MESSAGE)]
    TimedOut,

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Api(#[from] RunningHubError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Executes prepared step plans against the remote API.
pub struct StepExecutor {
    store: Arc<dyn PipelineStore>,
    client: Arc<dyn JobApi>,
    fetcher: Arc<dyn AssetFetcher>,
    remote: Arc<RunningHubConfig>,
}

impl StepExecutor {
    pub fn new(
        store: Arc<dyn PipelineStore>,
        client: Arc<dyn JobApi>,
        fetcher: Arc<dyn AssetFetcher>,
        remote: Arc<RunningHubConfig>,
    ) -> Self {
        Self {
            store,
            client,
            fetcher,
            remote,
        }
    }

    /// Run one prepared step end to end, returning the result artifact.
    ///
    /// Any failure is first recorded on the task row, then propagated
    /// so the pipeline loop can persist it as the run's last error.
    pub async fn execute(&self, project: &Project, plan: StepPlan) -> Result<Asset, ExecuteError> {
        let task = self
            .store
            .create_task(NewTask {
                project_id: project.id,
                step: plan.step,
                input_params: plan.input_params.clone(),
            })
            .await?;
        self.store.begin_task(task.id).await?;

        tracing::info!(
            project_id = project.id,
            task_id = task.id,
            step = %plan.step,
            "Executing step",
        );

        match self.run_remote(project, &plan, task.id).await {
            Ok(asset) => Ok(asset),
            Err(e) => {
                if let Err(store_err) = self.store.fail_task(task.id, &e.to_string()).await {
                    tracing::error!(
                        task_id = task.id,
                        error = %store_err,
                        "Failed to record task failure",
                    );
                }
                Err(e)
            }
        }
    }

    async fn run_remote(
        &self,
        project: &Project,
        plan: &StepPlan,
        task_id: DbId,
    ) -> Result<Asset, ExecuteError> {
        let app = self.remote.app(plan.step);

        let mut params = JobParams::new();
        for upload in &plan.uploads {
            let bytes = self.fetcher.fetch(&upload.asset).await?;
            match self.client.upload_file(bytes, &upload.asset.filename).await? {
                Some(remote_name) => {
                    params.insert(upload.param.to_owned(), remote_name);
                }
                None => return Err(ExecuteError::UploadRejected { param: upload.param }),
            }
        }
        for (param, value) in &plan.text_params {
            params.insert((*param).to_owned(), value.clone());
        }

        let response = self.client.create_task(&app, &params, None).await?;
        if !response.accepted() {
            return Err(ExecuteError::SubmissionRejected(
                response
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "task creation failed".into()),
            ));
        }
        // accepted() guarantees a non-empty task id.
        let remote_task_id = response.task_id.clone().unwrap_or_default();
        self.store
            .mark_task_running(task_id, &remote_task_id, response.client_id.as_deref())
            .await?;

        let observer = TaskProgress {
            store: Arc::clone(&self.store),
            task_id,
        };
        let poll = PollConfig::with_timeout(self.remote.task_timeout(&app));
        let outcome = wait_for_completion(
            self.client.as_ref(),
            &remote_task_id,
            &poll,
            Some(&observer),
        )
        .await?;

        let status = match outcome {
            PollOutcome::Finished(status) => status,
            PollOutcome::TimedOut => return Err(ExecuteError::TimedOut),
        };

        match status.status {
            RemoteStatus::Success => self.register_result(project, plan.step, task_id, &status).await,
            RemoteStatus::Failed => Err(ExecuteError::RemoteFailed(
                status
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "task failed".into()),
            )),
            RemoteStatus::Running => Err(ExecuteError::RemoteFailed(
                "polling ended without a terminal status".into(),
            )),
        }
    }

    async fn register_result(
        &self,
        project: &Project,
        step: StepKind,
        task_id: DbId,
        status: &NormalizedStatus,
    ) -> Result<Asset, ExecuteError> {
        let Some(result_url) = status.result_url.clone() else {
            // A step must produce exactly one artifact; a success report
            // with no output cannot feed downstream steps.
            return Err(ExecuteError::RemoteFailed(
                "task finished without an output".into(),
            ));
        };

        let ext = artifacts::guess_extension(Some(&result_url), step, &[]);
        let display_name =
            artifacts::result_display_name(&project.name, step, &ext, chrono::Utc::now());

        let asset = self
            .store
            .create_result_asset(NewResultAsset {
                user_id: project.user_id,
                display_name,
                file_url: result_url.clone(),
                asset_kind: step.result_asset_kind(),
                mime_type: artifacts::mime_from_extension(&ext),
            })
            .await?;

        self.store
            .complete_task(task_id, Some(&result_url), Some(asset.id))
            .await?;
        if let Some(usage) = &status.usage {
            self.store.update_task_usage(task_id, usage).await?;
        }
        self.store
            .record_step_result(project.id, step, asset.id)
            .await?;

        tracing::info!(
            project_id = project.id,
            task_id,
            step = %step,
            asset_id = asset.id,
            result_url = %result_url,
            "Step succeeded",
        );
        Ok(asset)
    }
}

/// Mirrors poll progress onto the task row. Store errors propagate to
/// the poller, which logs and discards them.
struct TaskProgress {
    store: Arc<dyn PipelineStore>,
    task_id: DbId,
}

#[async_trait]
impl PollObserver for TaskProgress {
    async fn on_poll(
        &self,
        _status: &NormalizedStatus,
        progress: i16,
        _elapsed: std::time::Duration,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.store.update_task_progress(self.task_id, progress).await?;
        Ok(())
    }
}
