//! Shared test doubles: an in-memory [`PipelineStore`], a scripted
//! remote API, and fixture builders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use modella_core::step::StepKind;
use modella_core::types::DbId;
use modella_db::models::asset::{Asset, NewResultAsset};
use modella_db::models::project::Project;
use modella_db::models::status::{ProjectStatus, TaskStatus};
use modella_db::models::task::{NewTask, Task};
use modella_pipeline::fetch::{AssetFetcher, FetchError};
use modella_pipeline::store::{PipelineStore, StoreError};
use modella_pipeline::{PipelineController, StepRegistry};
use modella_runninghub::apps::{AppConfig, JobParams};
use modella_runninghub::client::{JobApi, RunningHubConfig, RunningHubError, SubmitResponse};
use modella_runninghub::response::{NormalizedStatus, RemoteStatus, TaskUsage};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn remote_config() -> RunningHubConfig {
    RunningHubConfig {
        api_key: "test-key".into(),
        base_url: "http://remote.test".into(),
        try_on_app_id: "app-tryon".into(),
        background_app_id: "app-background".into(),
        video_app_id: "app-video".into(),
        max_task_timeout_secs: None,
    }
}

/// A project with try-on and background enabled, inputs wired to
/// assets 1 (model) and 2 (clothing).
pub fn project_fixture(id: DbId) -> Project {
    let now = Utc::now();
    Project {
        id,
        user_id: 7,
        name: "Spring Lookbook".into(),
        status_id: ProjectStatus::Draft.id(),
        enable_try_on: true,
        enable_background: true,
        enable_video: false,
        step_order: None,
        try_on_person_source: "auto".into(),
        background_person_source: "auto".into(),
        video_person_source: "auto".into(),
        model_image_id: Some(1),
        clothing_image_id: Some(2),
        background_image_id: None,
        reference_video_id: None,
        video_skip_seconds: 0,
        video_duration: 10,
        video_fps: 30,
        video_width: 720,
        video_height: 1280,
        try_on_result_id: None,
        background_result_id: None,
        video_result_id: None,
        pipeline_active: false,
        pipeline_cancel_requested: false,
        pipeline_chain: true,
        pipeline_start_step: None,
        pipeline_current_step: None,
        pipeline_last_error: None,
        pipeline_started_at: None,
        pipeline_updated_at: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn asset_fixture(id: DbId, kind: &str, filename: &str) -> Asset {
    Asset {
        id,
        user_id: 7,
        filename: filename.into(),
        display_name: None,
        original_filename: filename.into(),
        file_path: format!("uploads/7/{filename}"),
        file_url: format!("/files/7/{filename}"),
        asset_kind: kind.into(),
        mime_type: "image/png".into(),
        file_size: 1024,
        created_at: Utc::now(),
    }
}

pub fn running_status(progress: i16) -> NormalizedStatus {
    NormalizedStatus {
        status: RemoteStatus::Running,
        progress,
        result_url: None,
        usage: None,
        error_message: None,
    }
}

pub fn success_status(url: &str) -> NormalizedStatus {
    NormalizedStatus {
        status: RemoteStatus::Success,
        progress: 100,
        result_url: Some(url.into()),
        usage: Some(TaskUsage {
            cost_time_secs: Some(42),
            consume_money: Some(0.25),
            consume_coins: Some(5),
            third_party_cost: None,
        }),
        error_message: None,
    }
}

pub fn failed_status(message: &str) -> NormalizedStatus {
    NormalizedStatus {
        status: RemoteStatus::Failed,
        progress: 0,
        result_url: None,
        usage: None,
        error_message: Some(message.into()),
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryInner {
    projects: HashMap<DbId, Project>,
    assets: HashMap<DbId, Asset>,
    tasks: HashMap<DbId, Task>,
    next_id: DbId,
}

/// In-memory [`PipelineStore`] with the same transition semantics as
/// the Postgres repositories.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        let store = MemoryStore::default();
        store.inner.lock().unwrap().next_id = 1000;
        Arc::new(store)
    }

    pub fn insert_project(&self, project: Project) {
        self.inner.lock().unwrap().projects.insert(project.id, project);
    }

    pub fn insert_asset(&self, asset: Asset) {
        self.inner.lock().unwrap().assets.insert(asset.id, asset);
    }

    pub fn insert_task(&self, task: Task) {
        self.inner.lock().unwrap().tasks.insert(task.id, task);
    }

    pub fn project(&self, id: DbId) -> Project {
        self.inner.lock().unwrap().projects[&id].clone()
    }

    pub fn all_tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.inner.lock().unwrap().tasks.values().cloned().collect();
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    pub fn all_assets(&self) -> Vec<Asset> {
        let mut assets: Vec<Asset> = self.inner.lock().unwrap().assets.values().cloned().collect();
        assets.sort_by_key(|a| a.id);
        assets
    }

    /// Raise the cancel flag directly, bypassing the active check.
    pub fn set_cancel_flag(&self, id: DbId) {
        if let Some(project) = self.inner.lock().unwrap().projects.get_mut(&id) {
            project.pipeline_cancel_requested = true;
        }
    }

    fn alloc_id(inner: &mut MemoryInner) -> DbId {
        inner.next_id += 1;
        inner.next_id
    }
}

#[async_trait]
impl PipelineStore for MemoryStore {
    async fn load_project(&self, id: DbId) -> Result<Option<Project>, StoreError> {
        Ok(self.inner.lock().unwrap().projects.get(&id).cloned())
    }

    async fn try_activate_run(
        &self,
        id: DbId,
        start_step: StepKind,
        chain: bool,
    ) -> Result<Option<Project>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(project) = inner.projects.get_mut(&id) else {
            return Ok(None);
        };
        if project.pipeline_active {
            return Ok(None);
        }
        project.pipeline_active = true;
        project.pipeline_cancel_requested = false;
        project.pipeline_chain = chain;
        project.pipeline_start_step = Some(start_step.as_str().into());
        project.pipeline_current_step = None;
        project.pipeline_last_error = None;
        project.pipeline_started_at = Some(Utc::now());
        project.pipeline_updated_at = Some(Utc::now());
        project.status_id = ProjectStatus::Processing.id();
        Ok(Some(project.clone()))
    }

    async fn request_cancel(&self, id: DbId) -> Result<Option<Project>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(project) = inner.projects.get_mut(&id) else {
            return Ok(None);
        };
        if !project.pipeline_active {
            return Ok(None);
        }
        project.pipeline_cancel_requested = true;
        project.pipeline_updated_at = Some(Utc::now());
        Ok(Some(project.clone()))
    }

    async fn set_current_step(&self, id: DbId, step: Option<StepKind>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(project) = inner.projects.get_mut(&id) {
            project.pipeline_current_step = step.map(|s| s.as_str().into());
            project.pipeline_updated_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn finish_run(
        &self,
        id: DbId,
        status: ProjectStatus,
        last_error: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(project) = inner.projects.get_mut(&id) {
            project.pipeline_active = false;
            project.pipeline_cancel_requested = false;
            project.pipeline_current_step = None;
            project.pipeline_last_error = last_error.map(str::to_owned);
            project.pipeline_updated_at = Some(Utc::now());
            project.status_id = status.id();
        }
        Ok(())
    }

    async fn record_step_result(
        &self,
        project_id: DbId,
        step: StepKind,
        asset_id: DbId,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(project) = inner.projects.get_mut(&project_id) {
            match step {
                StepKind::TryOn => project.try_on_result_id = Some(asset_id),
                StepKind::Background => project.background_result_id = Some(asset_id),
                StepKind::Video => project.video_result_id = Some(asset_id),
            }
        }
        Ok(())
    }

    async fn active_task_count(&self, project_id: DbId) -> Result<i64, StoreError> {
        let inner = self.inner.lock().unwrap();
        let count = inner
            .tasks
            .values()
            .filter(|t| t.project_id == project_id)
            .filter(|t| {
                matches!(
                    t.status(),
                    Some(TaskStatus::Queued) | Some(TaskStatus::Running)
                )
            })
            .count();
        Ok(count as i64)
    }

    async fn load_asset(&self, id: DbId) -> Result<Option<Asset>, StoreError> {
        Ok(self.inner.lock().unwrap().assets.get(&id).cloned())
    }

    async fn create_result_asset(&self, asset: NewResultAsset) -> Result<Asset, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let id = Self::alloc_id(&mut inner);
        let row = Asset {
            id,
            user_id: asset.user_id,
            filename: asset.display_name.clone(),
            display_name: Some(asset.display_name.clone()),
            original_filename: asset.display_name,
            file_path: asset.file_url.clone(),
            file_url: asset.file_url,
            asset_kind: asset.asset_kind.into(),
            mime_type: asset.mime_type.into(),
            file_size: 0,
            created_at: Utc::now(),
        };
        inner.assets.insert(id, row.clone());
        Ok(row)
    }

    async fn create_task(&self, task: NewTask) -> Result<Task, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let id = Self::alloc_id(&mut inner);
        let row = Task {
            id,
            project_id: task.project_id,
            step: task.step.as_str().into(),
            status_id: TaskStatus::Pending.id(),
            remote_task_id: None,
            remote_client_id: None,
            input_params: task.input_params,
            result_url: None,
            result_asset_id: None,
            progress_percent: 0,
            error_message: None,
            cost_time_secs: None,
            consume_money: None,
            consume_coins: None,
            third_party_cost: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        inner.tasks.insert(id, row.clone());
        Ok(row)
    }

    async fn load_task(&self, id: DbId) -> Result<Option<Task>, StoreError> {
        Ok(self.inner.lock().unwrap().tasks.get(&id).cloned())
    }

    async fn find_task_by_remote_id(
        &self,
        remote_task_id: &str,
    ) -> Result<Option<Task>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .tasks
            .values()
            .filter(|t| t.remote_task_id.as_deref() == Some(remote_task_id))
            .max_by_key(|t| t.id)
            .cloned())
    }

    async fn begin_task(&self, id: DbId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(task) = inner.tasks.get_mut(&id) {
            task.status_id = TaskStatus::Queued.id();
            task.started_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn mark_task_running(
        &self,
        id: DbId,
        remote_task_id: &str,
        remote_client_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(task) = inner.tasks.get_mut(&id) {
            task.status_id = TaskStatus::Running.id();
            task.remote_task_id = Some(remote_task_id.into());
            task.remote_client_id = remote_client_id.map(str::to_owned);
        }
        Ok(())
    }

    async fn update_task_progress(&self, id: DbId, percent: i16) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(task) = inner.tasks.get_mut(&id) {
            task.progress_percent = percent;
        }
        Ok(())
    }

    async fn complete_task(
        &self,
        id: DbId,
        result_url: Option<&str>,
        result_asset_id: Option<DbId>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(task) = inner.tasks.get_mut(&id) {
            task.status_id = TaskStatus::Succeeded.id();
            task.result_url = result_url.map(str::to_owned);
            task.result_asset_id = result_asset_id;
            task.progress_percent = 100;
            task.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn fail_task(&self, id: DbId, error: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(task) = inner.tasks.get_mut(&id) {
            task.status_id = TaskStatus::Failed.id();
            task.error_message = Some(error.into());
            task.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn update_task_usage(&self, id: DbId, usage: &TaskUsage) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(task) = inner.tasks.get_mut(&id) {
            if let Some(v) = usage.cost_time_secs {
                task.cost_time_secs = Some(v as i32);
            }
            if let Some(v) = usage.consume_money {
                task.consume_money = Some(v);
            }
            if let Some(v) = usage.consume_coins {
                task.consume_coins = Some(v as i32);
            }
            if let Some(v) = usage.third_party_cost {
                task.third_party_cost = Some(v);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scripted remote API
// ---------------------------------------------------------------------------

type SubmitHook = Box<dyn Fn(usize) + Send + Sync>;

/// Scripted [`JobApi`]. Submissions auto-accept with generated ids
/// unless a scripted response is queued; polls pop the status script,
/// repeating its last entry, and default to immediate success.
#[derive(Default)]
pub struct MockJobApi {
    submit_script: Mutex<Vec<SubmitResponse>>,
    status_script: Mutex<Vec<NormalizedStatus>>,
    pub submissions: Mutex<Vec<(StepKind, JobParams)>>,
    pub uploads: Mutex<Vec<String>>,
    pub cancels: Mutex<Vec<String>>,
    reject_uploads: AtomicBool,
    submit_count: AtomicUsize,
    on_submit: Mutex<Option<SubmitHook>>,
}

impl MockJobApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a scripted submit response (consumed FIFO).
    pub fn push_submit(&self, response: SubmitResponse) {
        self.submit_script.lock().unwrap().push(response);
    }

    /// Queue scripted poll statuses (consumed FIFO, last repeats).
    pub fn push_statuses(&self, statuses: Vec<NormalizedStatus>) {
        self.status_script.lock().unwrap().extend(statuses);
    }

    pub fn reject_uploads(&self) {
        self.reject_uploads.store(true, Ordering::SeqCst);
    }

    /// Hook invoked after each submission with its zero-based index.
    pub fn on_submit(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
        *self.on_submit.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn rejected_submit(message: &str) -> SubmitResponse {
        SubmitResponse {
            task_id: Some(String::new()),
            error_code: Some("ERR".into()),
            error_message: Some(message.into()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl JobApi for MockJobApi {
    async fn create_task(
        &self,
        app: &AppConfig,
        params: &JobParams,
        _client_id: Option<String>,
    ) -> Result<SubmitResponse, RunningHubError> {
        let index = self.submit_count.fetch_add(1, Ordering::SeqCst);
        self.submissions
            .lock()
            .unwrap()
            .push((app.step, params.clone()));

        let response = {
            let mut script = self.submit_script.lock().unwrap();
            if script.is_empty() {
                SubmitResponse {
                    task_id: Some(format!("rh-{}", index + 1)),
                    status: Some("RUNNING".into()),
                    client_id: Some(format!("client-{}", index + 1)),
                    ..Default::default()
                }
            } else {
                script.remove(0)
            }
        };

        if let Some(hook) = self.on_submit.lock().unwrap().as_ref() {
            hook(index);
        }
        Ok(response)
    }

    async fn task_status(&self, task_id: &str) -> Result<NormalizedStatus, RunningHubError> {
        let mut script = self.status_script.lock().unwrap();
        if script.is_empty() {
            Ok(success_status(&format!("https://cdn.test/{task_id}.png")))
        } else if script.len() == 1 {
            Ok(script[0].clone())
        } else {
            Ok(script.remove(0))
        }
    }

    async fn cancel_task(&self, task_id: &str) -> Result<bool, RunningHubError> {
        self.cancels.lock().unwrap().push(task_id.into());
        Ok(true)
    }

    async fn upload_file(
        &self,
        _data: Vec<u8>,
        filename: &str,
    ) -> Result<Option<String>, RunningHubError> {
        if self.reject_uploads.load(Ordering::SeqCst) {
            return Ok(None);
        }
        self.uploads.lock().unwrap().push(filename.to_owned());
        Ok(Some(format!("api/{filename}")))
    }
}

// ---------------------------------------------------------------------------
// Stub fetcher + harness
// ---------------------------------------------------------------------------

pub struct StubFetcher;

#[async_trait]
impl AssetFetcher for StubFetcher {
    async fn fetch(&self, _asset: &Asset) -> Result<Vec<u8>, FetchError> {
        Ok(vec![0xAB; 16])
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub api: Arc<MockJobApi>,
    pub controller: PipelineController,
}

pub fn harness() -> Harness {
    harness_with_registry(StepRegistry::standard())
}

pub fn harness_with_registry(registry: StepRegistry) -> Harness {
    let store = MemoryStore::new();
    let api = MockJobApi::new();
    let controller = PipelineController::new(
        Arc::clone(&store) as Arc<dyn PipelineStore>,
        Arc::clone(&api) as Arc<dyn JobApi>,
        Arc::new(StubFetcher),
        Arc::new(registry),
        Arc::new(remote_config()),
    );
    Harness {
        store,
        api,
        controller,
    }
}

/// Poll the store until the run goes idle.
pub async fn wait_until_idle(store: &MemoryStore, project_id: DbId) -> Project {
    for _ in 0..500 {
        let project = store.project(project_id);
        if !project.pipeline_active {
            return project;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("pipeline run never went idle");
}
