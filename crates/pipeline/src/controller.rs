//! The sequential pipeline state machine.
//!
//! `start` validates synchronously, claims the run with one atomic
//! conditional update, and detaches the step loop onto the runtime; the
//! request returns as soon as the run state is persisted. The loop
//! reloads the project before every step -- the request path and the
//! loop hold independently loaded copies of the same rows, so a stale
//! in-memory snapshot must never drive a decision. Cancellation is
//! cooperative: the flag is checked once per step boundary and never
//! interrupts an in-flight step (the remote protocol offers no hard
//! mid-step cancel; the poller's timeout path is the only place a
//! remote cancel is issued).

use std::sync::Arc;

use modella_core::step::StepKind;
use modella_core::types::DbId;
use modella_db::models::project::Project;
use modella_db::models::status::ProjectStatus;
use modella_runninghub::client::{JobApi, RunningHubConfig};

use crate::executor::StepExecutor;
use crate::fetch::AssetFetcher;
use crate::runners::{PrepareError, StepRegistry};
use crate::store::{PipelineStore, StoreError};

/// Options for a pipeline start request.
#[derive(Debug, Clone)]
pub struct StartOptions {
    /// First step to run. Defaults to the first enabled step.
    pub start_step: Option<StepKind>,
    /// Run every enabled step from `start_step` onward, or just the one.
    pub chain: bool,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            start_step: None,
            chain: true,
        }
    }
}

/// Synchronous rejections of a start (or cancel) request. Execution
/// errors never surface here; they are read back from the persisted
/// run state.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("project {0} not found")]
    ProjectNotFound(DbId),

    #[error("no enabled steps to run")]
    NoEnabledSteps,

    #[error("step {0} is not in the enabled step order")]
    StepNotEnabled(StepKind),

    #[error("a pipeline run is already active for this project")]
    AlreadyActive,

    #[error("missing required inputs: {}", .0.join(", "))]
    MissingInputs(Vec<String>),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Owns the sequential step loop for every project's pipeline runs.
pub struct PipelineController {
    store: Arc<dyn PipelineStore>,
    client: Arc<dyn JobApi>,
    fetcher: Arc<dyn AssetFetcher>,
    registry: Arc<StepRegistry>,
    remote: Arc<RunningHubConfig>,
}

impl PipelineController {
    pub fn new(
        store: Arc<dyn PipelineStore>,
        client: Arc<dyn JobApi>,
        fetcher: Arc<dyn AssetFetcher>,
        registry: Arc<StepRegistry>,
        remote: Arc<RunningHubConfig>,
    ) -> Self {
        Self {
            store,
            client,
            fetcher,
            registry,
            remote,
        }
    }

    /// Start a pipeline run and detach its step loop.
    ///
    /// Returns the activated run state. Rejections happen in order:
    /// unknown project, empty step order, start step not enabled, a
    /// queued/running task (advisory), missing first-step inputs, and
    /// finally the atomic activation itself losing to a concurrent
    /// start.
    pub async fn start(
        &self,
        project_id: DbId,
        options: StartOptions,
    ) -> Result<Project, StartError> {
        let project = self
            .store
            .load_project(project_id)
            .await?
            .ok_or(StartError::ProjectNotFound(project_id))?;

        let config = project.workflow_config();
        let ordered = config.ordered_steps();
        if ordered.is_empty() {
            return Err(StartError::NoEnabledSteps);
        }

        let start_step = options.start_step.unwrap_or(ordered[0]);
        let Some(start_index) = ordered.iter().position(|s| *s == start_step) else {
            return Err(StartError::StepNotEnabled(start_step));
        };

        // Advisory guard: a queued or running task means a loop is (or
        // recently was) working this project. The activation update
        // below is the authoritative check.
        if self.store.active_task_count(project_id).await? > 0 {
            return Err(StartError::AlreadyActive);
        }

        // Surface missing first-step inputs before any state changes.
        // Later steps are checked when their turn comes, since their
        // inputs may only materialize from earlier results.
        if let Some(runner) = self.registry.get(start_step) {
            match runner.prepare(self.store.as_ref(), &project).await {
                Ok(_) => {}
                Err(PrepareError::Missing(missing)) => {
                    return Err(StartError::MissingInputs(missing));
                }
                Err(PrepareError::Store(e)) => return Err(StartError::Store(e)),
            }
        }

        let project = self
            .store
            .try_activate_run(project_id, start_step, options.chain)
            .await?
            .ok_or(StartError::AlreadyActive)?;

        let run_list: Vec<StepKind> = if options.chain {
            ordered[start_index..].to_vec()
        } else {
            vec![start_step]
        };

        tracing::info!(
            project_id,
            start_step = %start_step,
            chain = options.chain,
            steps = run_list.len(),
            "Pipeline run starting",
        );

        let store = Arc::clone(&self.store);
        let client = Arc::clone(&self.client);
        let fetcher = Arc::clone(&self.fetcher);
        let registry = Arc::clone(&self.registry);
        let remote = Arc::clone(&self.remote);
        tokio::spawn(async move {
            run_loop(store, client, fetcher, registry, remote, project_id, run_list).await;
        });

        Ok(project)
    }

    /// Request cancellation of the active run.
    ///
    /// Never interrupts an in-flight step; the flag only prevents the
    /// next step from starting. A no-op when no run is active.
    pub async fn cancel(&self, project_id: DbId) -> Result<Project, StartError> {
        if let Some(project) = self.store.request_cancel(project_id).await? {
            tracing::info!(project_id, "Pipeline cancellation requested");
            return Ok(project);
        }
        self.store
            .load_project(project_id)
            .await?
            .ok_or(StartError::ProjectNotFound(project_id))
    }
}

/// The detached sequential step loop.
///
/// Every error is converted into persisted run state; nothing escapes
/// the loop.
async fn run_loop(
    store: Arc<dyn PipelineStore>,
    client: Arc<dyn JobApi>,
    fetcher: Arc<dyn AssetFetcher>,
    registry: Arc<StepRegistry>,
    remote: Arc<RunningHubConfig>,
    project_id: DbId,
    run_list: Vec<StepKind>,
) {
    let executor = StepExecutor::new(
        Arc::clone(&store),
        client,
        fetcher,
        Arc::clone(&remote),
    );

    for step in run_list {
        // Reload: the loop must act on the latest persisted state, not
        // the snapshot the start request validated against.
        let project = match store.load_project(project_id).await {
            Ok(Some(project)) => project,
            Ok(None) => {
                tracing::error!(project_id, "Project disappeared mid-run; stopping");
                return;
            }
            Err(e) => {
                tracing::error!(project_id, error = %e, "Failed to reload project; stopping");
                finish(&store, project_id, ProjectStatus::Failed, Some(&e.to_string())).await;
                return;
            }
        };

        if project.pipeline_cancel_requested {
            tracing::info!(project_id, step = %step, "Cancellation requested; stopping before step");
            // A cancelled run is neither completed nor failed; the
            // project returns to draft.
            finish(&store, project_id, ProjectStatus::Draft, None).await;
            return;
        }

        if let Err(e) = store.set_current_step(project_id, Some(step)).await {
            tracing::error!(project_id, step = %step, error = %e, "Failed to persist current step");
            finish(&store, project_id, ProjectStatus::Failed, Some(&e.to_string())).await;
            return;
        }

        let Some(runner) = registry.get(step) else {
            // A deliberately-unfinished step is not an error condition.
            let note = format!("step {step} is not integrated");
            tracing::warn!(project_id, step = %step, "Step has no executor; stopping pipeline");
            finish(&store, project_id, ProjectStatus::Completed, Some(&note)).await;
            return;
        };

        let plan = match runner.prepare(store.as_ref(), &project).await {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!(project_id, step = %step, error = %e, "Step preconditions failed");
                finish(&store, project_id, ProjectStatus::Failed, Some(&e.to_string())).await;
                return;
            }
        };

        if let Err(e) = executor.execute(&project, plan).await {
            tracing::warn!(project_id, step = %step, error = %e, "Step failed; aborting run");
            finish(&store, project_id, ProjectStatus::Failed, Some(&e.to_string())).await;
            return;
        }
    }

    tracing::info!(project_id, "Pipeline run completed");
    finish(&store, project_id, ProjectStatus::Completed, None).await;
}

/// Persist the terminal run state; a failure here can only be logged.
async fn finish(
    store: &Arc<dyn PipelineStore>,
    project_id: DbId,
    status: ProjectStatus,
    last_error: Option<&str>,
) {
    if let Err(e) = store.finish_run(project_id, status, last_error).await {
        tracing::error!(project_id, error = %e, "Failed to persist terminal run state");
    }
}
