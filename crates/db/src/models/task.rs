//! Task entity model and DTOs.
//!
//! One task row tracks one remote execution of a single pipeline step.
//! Lifecycle: Pending -> Queued -> Running -> {Succeeded, Failed}.
//! Terminal rows are immutable except for usage enrichment pushed later
//! by the remote webhook.

use serde::Serialize;
use sqlx::FromRow;

use modella_core::step::StepKind;
use modella_core::types::{DbId, Timestamp};

use super::status::{StatusId, TaskStatus};

/// A row from the `tasks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Task {
    pub id: DbId,
    pub project_id: DbId,
    /// Step identifier string (see `StepKind::as_str`).
    pub step: String,
    pub status_id: StatusId,
    pub remote_task_id: Option<String>,
    pub remote_client_id: Option<String>,
    pub input_params: serde_json::Value,
    pub result_url: Option<String>,
    pub result_asset_id: Option<DbId>,
    pub progress_percent: i16,
    pub error_message: Option<String>,
    pub cost_time_secs: Option<i32>,
    pub consume_money: Option<f64>,
    pub consume_coins: Option<i32>,
    pub third_party_cost: Option<f64>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl Task {
    pub fn status(&self) -> Option<TaskStatus> {
        TaskStatus::from_id(self.status_id)
    }

    pub fn step_kind(&self) -> Option<StepKind> {
        StepKind::parse(&self.step)
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_some_and(TaskStatus::is_terminal)
    }
}

/// DTO for creating a new pending task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub project_id: DbId,
    pub step: StepKind,
    pub input_params: serde_json::Value,
}
