//! Per-step input preparation.
//!
//! A runner turns a project row into a [`StepPlan`]: the uploads to
//! perform, the text parameters to pass through, and the input-params
//! record for the task row. Preparation performs no remote calls, so
//! every missing precondition is enumerated before a job is created
//! and a doomed start can be rejected synchronously.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use modella_core::person_source::resolve_person_input;
use modella_core::step::StepKind;
use modella_core::types::DbId;
use modella_db::models::asset::{Asset, KIND_REFERENCE_VIDEO};
use modella_db::models::project::Project;

use crate::store::{PipelineStore, StoreError};

/// One asset to upload, keyed by the semantic parameter it feeds.
#[derive(Debug, Clone)]
pub struct PlannedUpload {
    pub param: &'static str,
    pub asset: Asset,
}

/// Everything a step needs before any remote call is made.
#[derive(Debug, Clone)]
pub struct StepPlan {
    pub step: StepKind,
    /// Input record persisted on the task row.
    pub input_params: serde_json::Value,
    pub uploads: Vec<PlannedUpload>,
    /// Pass-through text parameters (already stringified).
    pub text_params: Vec<(&'static str, String)>,
}

#[derive(Debug, thiserror::Error)]
pub enum PrepareError {
    /// Required inputs that are absent or do not resolve to an asset.
    #[error("missing required inputs: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Builds the input plan for one step kind.
#[async_trait]
pub trait StepRunner: Send + Sync {
    fn kind(&self) -> StepKind;

    async fn prepare(
        &self,
        store: &dyn PipelineStore,
        project: &Project,
    ) -> Result<StepPlan, PrepareError>;
}

/// Load an asset for a required input, recording a precondition
/// failure when the reference is null or dangling.
async fn require_asset(
    store: &dyn PipelineStore,
    id: Option<DbId>,
    label: &str,
    missing: &mut Vec<String>,
) -> Result<Option<Asset>, StoreError> {
    match id {
        None => {
            missing.push(label.to_owned());
            Ok(None)
        }
        Some(id) => match store.load_asset(id).await? {
            Some(asset) => Ok(Some(asset)),
            None => {
                missing.push(format!("{label} (asset {id} not found)"));
                Ok(None)
            }
        },
    }
}

fn asset_record(asset: &Asset) -> serde_json::Value {
    serde_json::json!({ "id": asset.id, "url": asset.file_url })
}

/// Virtual try-on: person image + garment image.
pub struct TryOnRunner;

#[async_trait]
impl StepRunner for TryOnRunner {
    fn kind(&self) -> StepKind {
        StepKind::TryOn
    }

    async fn prepare(
        &self,
        store: &dyn PipelineStore,
        project: &Project,
    ) -> Result<StepPlan, PrepareError> {
        let config = project.workflow_config();
        let ordered = config.ordered_steps();
        let person_id = resolve_person_input(
            &config,
            &ordered,
            StepKind::TryOn,
            &project.step_artifacts(),
        );

        let mut missing = Vec::new();
        let person = require_asset(store, person_id, "model_image", &mut missing).await?;
        let clothing =
            require_asset(store, project.clothing_image_id, "clothing_image", &mut missing)
                .await?;
        let (person, clothing) = match (person, clothing) {
            (Some(person), Some(clothing)) if missing.is_empty() => (person, clothing),
            _ => return Err(PrepareError::Missing(missing)),
        };

        Ok(StepPlan {
            step: StepKind::TryOn,
            input_params: serde_json::json!({
                "model_image": asset_record(&person),
                "clothing_image": asset_record(&clothing),
            }),
            uploads: vec![
                PlannedUpload { param: "model_image", asset: person },
                PlannedUpload { param: "clothing_image", asset: clothing },
            ],
            text_params: Vec::new(),
        })
    }
}

/// Background replacement: person image + optional background image.
pub struct BackgroundRunner;

#[async_trait]
impl StepRunner for BackgroundRunner {
    fn kind(&self) -> StepKind {
        StepKind::Background
    }

    async fn prepare(
        &self,
        store: &dyn PipelineStore,
        project: &Project,
    ) -> Result<StepPlan, PrepareError> {
        let config = project.workflow_config();
        let ordered = config.ordered_steps();
        let person_id = resolve_person_input(
            &config,
            &ordered,
            StepKind::Background,
            &project.step_artifacts(),
        );

        let mut missing = Vec::new();
        let person = require_asset(store, person_id, "source_image", &mut missing).await?;

        // The background image is optional, but a dangling reference is
        // still a precondition failure.
        let background = match project.background_image_id {
            None => None,
            Some(_) => {
                require_asset(store, project.background_image_id, "background_image", &mut missing)
                    .await?
            }
        };
        let person = match person {
            Some(person) if missing.is_empty() => person,
            _ => return Err(PrepareError::Missing(missing)),
        };

        let mut input_params = serde_json::json!({
            "source_image": asset_record(&person),
        });
        let mut uploads = vec![PlannedUpload { param: "source_image", asset: person }];
        if let Some(background) = background {
            input_params["background_image"] = asset_record(&background);
            uploads.push(PlannedUpload { param: "background_image", asset: background });
        }

        Ok(StepPlan {
            step: StepKind::Background,
            input_params,
            uploads,
            text_params: Vec::new(),
        })
    }
}

/// Motion transfer: person image + reference video + output geometry.
pub struct VideoRunner;

#[async_trait]
impl StepRunner for VideoRunner {
    fn kind(&self) -> StepKind {
        StepKind::Video
    }

    async fn prepare(
        &self,
        store: &dyn PipelineStore,
        project: &Project,
    ) -> Result<StepPlan, PrepareError> {
        let config = project.workflow_config();
        let ordered = config.ordered_steps();
        let person_id = resolve_person_input(
            &config,
            &ordered,
            StepKind::Video,
            &project.step_artifacts(),
        );

        let mut missing = Vec::new();
        let person = require_asset(store, person_id, "person_image", &mut missing).await?;
        let reference =
            require_asset(store, project.reference_video_id, "reference_video", &mut missing)
                .await?;

        if let Some(reference) = &reference {
            if reference.asset_kind != KIND_REFERENCE_VIDEO {
                missing.push(format!(
                    "reference_video (asset {} is {}, expected {KIND_REFERENCE_VIDEO})",
                    reference.id, reference.asset_kind,
                ));
            }
        }
        let (person, reference) = match (person, reference) {
            (Some(person), Some(reference)) if missing.is_empty() => (person, reference),
            _ => return Err(PrepareError::Missing(missing)),
        };

        let text_params: Vec<(&'static str, String)> = vec![
            ("skip_seconds", project.video_skip_seconds.to_string()),
            ("duration", project.video_duration.to_string()),
            ("fps", project.video_fps.to_string()),
            ("width", project.video_width.to_string()),
            ("height", project.video_height.to_string()),
        ];

        let mut input_params = serde_json::json!({
            "person_image": asset_record(&person),
            "reference_video": asset_record(&reference),
        });
        for (key, value) in &text_params {
            input_params[*key] = serde_json::Value::String(value.clone());
        }

        Ok(StepPlan {
            step: StepKind::Video,
            input_params,
            uploads: vec![
                PlannedUpload { param: "person_image", asset: person },
                PlannedUpload { param: "reference_video", asset: reference },
            ],
            text_params,
        })
    }
}

/// Maps step kinds to their runners. A step kind without an entry is
/// "not integrated": the pipeline stops there and marks the project
/// completed rather than failed.
pub struct StepRegistry {
    runners: HashMap<StepKind, Arc<dyn StepRunner>>,
}

impl StepRegistry {
    /// Registry with every production runner wired.
    pub fn standard() -> Self {
        Self::empty()
            .with(Arc::new(TryOnRunner))
            .with(Arc::new(BackgroundRunner))
            .with(Arc::new(VideoRunner))
    }

    pub fn empty() -> Self {
        Self {
            runners: HashMap::new(),
        }
    }

    pub fn with(mut self, runner: Arc<dyn StepRunner>) -> Self {
        self.runners.insert(runner.kind(), runner);
        self
    }

    pub fn get(&self, kind: StepKind) -> Option<Arc<dyn StepRunner>> {
        self.runners.get(&kind).cloned()
    }
}
