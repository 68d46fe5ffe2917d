//! Receiver for pushed RunningHub status callbacks.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use modella_pipeline::webhook::{apply_remote_update, WebhookOutcome};
use modella_pipeline::PgStore;

use crate::error::AppResult;
use crate::state::AppState;

/// POST /api/v1/webhooks/runninghub
///
/// Always acknowledges with 200; unknown or non-terminal payloads are
/// reported as ignored so the sender does not retry forever.
pub async fn runninghub_webhook(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> AppResult<impl IntoResponse> {
    let store = PgStore::new(state.pool.clone());
    let outcome = apply_remote_update(&store, &payload).await?;

    let body = match outcome {
        WebhookOutcome::Applied { task_id } => {
            serde_json::json!({ "status": "ok", "task_id": task_id })
        }
        WebhookOutcome::Ignored(reason) => {
            serde_json::json!({ "status": "ignored", "reason": reason })
        }
    };
    Ok(Json(body))
}
