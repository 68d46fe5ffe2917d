//! Project entity model.
//!
//! A project owns its workflow configuration, its input/result asset
//! references, and the run state of the (at most one) active pipeline.

use serde::Serialize;
use sqlx::FromRow;

use modella_core::person_source::{PersonSource, StepArtifacts};
use modella_core::step::{StepKind, WorkflowConfig};
use modella_core::types::{DbId, Timestamp};

use super::status::StatusId;

/// A row from the `projects` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Project {
    pub id: DbId,
    pub user_id: DbId,
    pub name: String,
    pub status_id: StatusId,

    // Workflow configuration
    pub enable_try_on: bool,
    pub enable_background: bool,
    pub enable_video: bool,
    /// Stored step order as a JSON array of step identifier strings.
    pub step_order: Option<serde_json::Value>,
    pub try_on_person_source: String,
    pub background_person_source: String,
    pub video_person_source: String,

    // Input asset references
    pub model_image_id: Option<DbId>,
    pub clothing_image_id: Option<DbId>,
    pub background_image_id: Option<DbId>,
    pub reference_video_id: Option<DbId>,

    // Motion-transfer parameters
    pub video_skip_seconds: i32,
    pub video_duration: i32,
    pub video_fps: i32,
    pub video_width: i32,
    pub video_height: i32,

    // Result asset references
    pub try_on_result_id: Option<DbId>,
    pub background_result_id: Option<DbId>,
    pub video_result_id: Option<DbId>,

    // Pipeline run state
    pub pipeline_active: bool,
    pub pipeline_cancel_requested: bool,
    pub pipeline_chain: bool,
    pub pipeline_start_step: Option<String>,
    pub pipeline_current_step: Option<String>,
    pub pipeline_last_error: Option<String>,
    pub pipeline_started_at: Option<Timestamp>,
    pub pipeline_updated_at: Option<Timestamp>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Project {
    /// Build the pure workflow configuration view of this row.
    ///
    /// Unknown step identifiers in the stored order are skipped; they
    /// come out again through `ordered_steps`'s canonical-append rule
    /// if their step is enabled.
    pub fn workflow_config(&self) -> WorkflowConfig {
        let step_order = self
            .step_order
            .as_ref()
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().and_then(StepKind::parse))
                    .collect()
            })
            .unwrap_or_default();

        WorkflowConfig {
            enable_try_on: self.enable_try_on,
            enable_background: self.enable_background,
            enable_video: self.enable_video,
            step_order,
            try_on_person_source: PersonSource::parse(Some(&self.try_on_person_source)),
            background_person_source: PersonSource::parse(Some(&self.background_person_source)),
            video_person_source: PersonSource::parse(Some(&self.video_person_source)),
        }
    }

    /// Artifact ids currently available to person-input resolution.
    pub fn step_artifacts(&self) -> StepArtifacts {
        StepArtifacts {
            base_person_image: self.model_image_id,
            try_on_result: self.try_on_result_id,
            background_result: self.background_result_id,
            video_result: self.video_result_id,
        }
    }

}
