//! Applies pushed terminal-status payloads from the remote API.
//!
//! The webhook and the polling loop can race: the same terminal status
//! may arrive twice, in either order. This path therefore runs the
//! payload through the same normalizer as polling and never overwrites
//! a task that already owns a result artifact; the only write allowed
//! on a terminal task is usage enrichment.

use serde_json::Value;

use modella_runninghub::response::{first_output_url, normalize_status, RemoteStatus};

use crate::artifacts;
use crate::store::{PipelineStore, StoreError};

use modella_core::types::DbId;
use modella_db::models::asset::NewResultAsset;

/// What the webhook did with a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Payload acknowledged but not applied.
    Ignored(&'static str),
    /// Task state (or at least its usage) was updated.
    Applied { task_id: DbId },
}

/// Apply a pushed status payload keyed by its remote task id.
pub async fn apply_remote_update(
    store: &dyn PipelineStore,
    payload: &Value,
) -> Result<WebhookOutcome, StoreError> {
    let Some(remote_id) = payload
        .get("taskId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
    else {
        return Ok(WebhookOutcome::Ignored("no task id"));
    };

    let Some(task) = store.find_task_by_remote_id(remote_id).await? else {
        tracing::debug!(remote_id, "Webhook for unknown task ignored");
        return Ok(WebhookOutcome::Ignored("unknown task"));
    };

    let normalized = normalize_status(payload);
    match normalized.status {
        RemoteStatus::Running => Ok(WebhookOutcome::Ignored("not terminal")),

        RemoteStatus::Failed => {
            if task.is_terminal() {
                return Ok(WebhookOutcome::Ignored("already terminal"));
            }
            store
                .fail_task(
                    task.id,
                    normalized.error_message.as_deref().unwrap_or("Unknown error"),
                )
                .await?;
            tracing::info!(task_id = task.id, remote_id, "Task failed via webhook");
            Ok(WebhookOutcome::Applied { task_id: task.id })
        }

        RemoteStatus::Success => {
            // Usage may arrive only on the webhook; record it even when
            // polling already finished the task.
            if let Some(usage) = &normalized.usage {
                store.update_task_usage(task.id, usage).await?;
            }

            if task.result_asset_id.is_some() || task.is_terminal() {
                return Ok(WebhookOutcome::Applied { task_id: task.id });
            }

            let outputs = output_items(payload);
            let result_url = normalized
                .result_url
                .clone()
                .or_else(|| first_output_url(outputs))
                .or_else(|| task.result_url.clone());

            match result_url {
                Some(url) => {
                    let Some(project) = store.load_project(task.project_id).await? else {
                        return Ok(WebhookOutcome::Ignored("project missing"));
                    };
                    let Some(step) = task.step_kind() else {
                        tracing::warn!(task_id = task.id, step = %task.step, "Task has unknown step kind");
                        return Ok(WebhookOutcome::Ignored("unknown step"));
                    };

                    let ext = artifacts::guess_extension(Some(&url), step, outputs);
                    let display_name = artifacts::result_display_name(
                        &project.name,
                        step,
                        &ext,
                        chrono::Utc::now(),
                    );
                    let asset = store
                        .create_result_asset(NewResultAsset {
                            user_id: project.user_id,
                            display_name,
                            file_url: url.clone(),
                            asset_kind: step.result_asset_kind(),
                            mime_type: artifacts::mime_from_extension(&ext),
                        })
                        .await?;
                    store.complete_task(task.id, Some(&url), Some(asset.id)).await?;
                    store.record_step_result(project.id, step, asset.id).await?;
                    tracing::info!(
                        task_id = task.id,
                        remote_id,
                        asset_id = asset.id,
                        "Task completed via webhook",
                    );
                }
                None => {
                    // The remote reported success without an output;
                    // trust the terminal state but register nothing.
                    store.complete_task(task.id, None, None).await?;
                }
            }
            Ok(WebhookOutcome::Applied { task_id: task.id })
        }
    }
}

/// Output list of a webhook payload: legacy pushes use `outputs`,
/// current pushes use `results`.
fn output_items(payload: &Value) -> &[Value] {
    for key in ["outputs", "results"] {
        if let Some(items) = payload.get(key).and_then(Value::as_array) {
            return items;
        }
    }
    &[]
}
