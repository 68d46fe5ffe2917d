//! Route table.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the application router.
pub fn build(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::health::healthz))
        .nest("/api/v1", api_routes())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/projects/{id}/pipeline/start",
            post(handlers::pipeline::start_pipeline),
        )
        .route(
            "/projects/{id}/pipeline/cancel",
            post(handlers::pipeline::cancel_pipeline),
        )
        .route("/projects/{id}/pipeline", get(handlers::pipeline::pipeline_state))
        .route("/projects/{id}/tasks", get(handlers::tasks::list_project_tasks))
        .route("/tasks/{id}", get(handlers::tasks::get_task))
        .route("/tasks/{id}/status", get(handlers::tasks::task_status))
        .route("/webhooks/runninghub", post(handlers::webhook::runninghub_webhook))
}
