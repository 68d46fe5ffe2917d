//! Step executor behavior: upload, submission, polling, and result
//! registration, one remote lifecycle at a time.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;

use common::*;
use modella_db::models::status::TaskStatus;
use modella_pipeline::runners::{StepRunner, TryOnRunner};
use modella_pipeline::store::PipelineStore;
use modella_pipeline::{ExecuteError, StepExecutor, TIMED_OUT_MESSAGE};
use modella_runninghub::client::{JobApi, RunningHubConfig};

struct Setup {
    store: Arc<MemoryStore>,
    api: Arc<MockJobApi>,
    executor: StepExecutor,
}

fn setup_with_config(remote: RunningHubConfig) -> Setup {
    let store = MemoryStore::new();
    let api = MockJobApi::new();
    store.insert_project(project_fixture(1));
    store.insert_asset(asset_fixture(1, "model_image", "model.png"));
    store.insert_asset(asset_fixture(2, "clothing_image", "dress.png"));
    let executor = StepExecutor::new(
        Arc::clone(&store) as Arc<dyn PipelineStore>,
        Arc::clone(&api) as Arc<dyn JobApi>,
        Arc::new(StubFetcher),
        Arc::new(remote),
    );
    Setup {
        store,
        api,
        executor,
    }
}

fn setup() -> Setup {
    setup_with_config(remote_config())
}

#[tokio::test(start_paused = true)]
async fn success_registers_artifact_and_usage() {
    let s = setup();
    s.api.push_statuses(vec![
        running_status(37),
        success_status("https://cdn.test/final.png"),
    ]);

    let project = s.store.project(1);
    let plan = TryOnRunner.prepare(s.store.as_ref() as &dyn PipelineStore, &project)
        .await
        .unwrap();
    let asset = s.executor.execute(&project, plan).await.unwrap();

    assert_eq!(asset.asset_kind, "try_on_result");
    assert_eq!(asset.file_url, "https://cdn.test/final.png");
    assert!(asset.display_name.as_deref().unwrap().starts_with("Spring Lookbook_try_on_"));
    assert!(asset.display_name.as_deref().unwrap().ends_with(".png"));

    let task = &s.store.all_tasks()[0];
    assert_eq!(task.status(), Some(TaskStatus::Succeeded));
    assert_eq!(task.remote_task_id.as_deref(), Some("rh-1"));
    assert_eq!(task.result_url.as_deref(), Some("https://cdn.test/final.png"));
    assert_eq!(task.result_asset_id, Some(asset.id));
    assert_eq!(task.progress_percent, 100);
    assert_eq!(task.cost_time_secs, Some(42));
    assert_eq!(task.consume_coins, Some(5));

    assert_eq!(s.store.project(1).try_on_result_id, Some(asset.id));

    // Both inputs were uploaded before submission.
    let uploads = s.api.uploads.lock().unwrap();
    assert_eq!(*uploads, vec!["model.png".to_string(), "dress.png".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn upload_rejection_fails_the_task() {
    let s = setup();
    s.api.reject_uploads();

    let project = s.store.project(1);
    let plan = TryOnRunner.prepare(s.store.as_ref() as &dyn PipelineStore, &project)
        .await
        .unwrap();
    let err = s.executor.execute(&project, plan).await.unwrap_err();

    assert_matches!(err, ExecuteError::UploadRejected { param: "model_image" });

    let task = &s.store.all_tasks()[0];
    assert_eq!(task.status(), Some(TaskStatus::Failed));
    assert_eq!(
        task.error_message.as_deref(),
        Some("failed to upload model_image to RunningHub"),
    );
    // Nothing was submitted.
    assert!(s.api.submissions.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn rejected_submission_never_polls() {
    let s = setup();
    s.api.push_submit(MockJobApi::rejected_submit("quota exhausted"));

    let project = s.store.project(1);
    let plan = TryOnRunner.prepare(s.store.as_ref() as &dyn PipelineStore, &project)
        .await
        .unwrap();
    let err = s.executor.execute(&project, plan).await.unwrap_err();

    match err {
        ExecuteError::SubmissionRejected(message) => assert_eq!(message, "quota exhausted"),
        other => panic!("expected SubmissionRejected, got {other:?}"),
    }

    let task = &s.store.all_tasks()[0];
    assert_eq!(task.status(), Some(TaskStatus::Failed));
    // Submission was rejected, so no remote task id was ever recorded.
    assert_eq!(task.remote_task_id, None);
}

#[tokio::test(start_paused = true)]
async fn remote_failure_carries_error_message() {
    let s = setup();
    s.api.push_statuses(vec![failed_status("NSFW content detected")]);

    let project = s.store.project(1);
    let plan = TryOnRunner.prepare(s.store.as_ref() as &dyn PipelineStore, &project)
        .await
        .unwrap();
    let err = s.executor.execute(&project, plan).await.unwrap_err();

    assert_matches!(err, ExecuteError::RemoteFailed(_));
    let task = &s.store.all_tasks()[0];
    assert_eq!(task.status(), Some(TaskStatus::Failed));
    assert!(task.error_message.as_deref().unwrap().contains("NSFW content detected"));
}

#[tokio::test(start_paused = true)]
async fn timeout_fails_task_and_cancels_remote() {
    let mut remote = remote_config();
    remote.max_task_timeout_secs = Some(6);
    let s = setup_with_config(remote);
    s.api.push_statuses(vec![running_status(0)]);

    let project = s.store.project(1);
    let plan = TryOnRunner.prepare(s.store.as_ref() as &dyn PipelineStore, &project)
        .await
        .unwrap();
    let err = s.executor.execute(&project, plan).await.unwrap_err();

    assert_matches!(err, ExecuteError::TimedOut);

    let task = &s.store.all_tasks()[0];
    assert_eq!(task.status(), Some(TaskStatus::Failed));
    assert_eq!(task.error_message.as_deref(), Some(TIMED_OUT_MESSAGE));

    // The remote task was asked to cancel, best-effort.
    assert_eq!(*s.api.cancels.lock().unwrap(), vec!["rh-1".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn success_without_output_is_a_failure() {
    let s = setup();
    let mut status = success_status("ignored");
    status.result_url = None;
    s.api.push_statuses(vec![status]);

    let project = s.store.project(1);
    let plan = TryOnRunner.prepare(s.store.as_ref() as &dyn PipelineStore, &project)
        .await
        .unwrap();
    let err = s.executor.execute(&project, plan).await.unwrap_err();

    assert_matches!(err, ExecuteError::RemoteFailed(_));
    assert_eq!(s.store.all_assets().len(), 2, "no result asset registered");
}
