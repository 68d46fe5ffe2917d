//! Remote application configurations for each pipeline step.
//!
//! Each RunningHub application exposes a fixed set of input nodes. The
//! static tables below map our semantic parameter names onto the
//! `(nodeId, fieldName)` pairs the API expects. Image inputs always
//! submit under the field name `"image"`; the binding's parameter name
//! is only the lookup key into the caller's params.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use modella_core::step::StepKind;

/// Semantic parameter map for one job submission. Values are upload
/// references returned by the file-upload endpoint, or stringified
/// scalars for text inputs.
pub type JobParams = BTreeMap<String, String>;

/// How a node input's `fieldName` is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Submits under the fixed field name `"image"`.
    Image,
    /// Submits under the binding's own parameter name.
    Text,
}

/// One input node of a remote application.
#[derive(Debug, Clone, Copy)]
pub struct NodeBinding {
    pub node_id: &'static str,
    /// Key under which the value is looked up in [`JobParams`].
    pub param: &'static str,
    pub field_type: FieldType,
}

/// One entry of the `nodeInfoList` submission payload.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub node_id: &'static str,
    pub field_name: &'static str,
    pub field_value: String,
}

const TRY_ON_BINDINGS: &[NodeBinding] = &[
    // Person image node
    NodeBinding { node_id: "107", param: "model_image", field_type: FieldType::Image },
    // Garment image node
    NodeBinding { node_id: "285", param: "clothing_image", field_type: FieldType::Image },
];

const BACKGROUND_BINDINGS: &[NodeBinding] = &[
    NodeBinding { node_id: "441", param: "source_image", field_type: FieldType::Image },
    NodeBinding { node_id: "446", param: "background_image", field_type: FieldType::Image },
];

const VIDEO_BINDINGS: &[NodeBinding] = &[
    NodeBinding { node_id: "image_input", param: "person_image", field_type: FieldType::Image },
    NodeBinding { node_id: "video_input", param: "reference_video", field_type: FieldType::Image },
    NodeBinding { node_id: "skip_seconds_input", param: "skip_seconds", field_type: FieldType::Text },
    NodeBinding { node_id: "duration_input", param: "duration", field_type: FieldType::Text },
    NodeBinding { node_id: "fps_input", param: "fps", field_type: FieldType::Text },
    NodeBinding { node_id: "width_input", param: "width", field_type: FieldType::Text },
    NodeBinding { node_id: "height_input", param: "height", field_type: FieldType::Text },
];

/// A step's RunningHub application: the hosted app id plus its static
/// input-node table and polling deadline.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub step: StepKind,
    pub app_id: String,
}

impl AppConfig {
    pub fn new(step: StepKind, app_id: impl Into<String>) -> Self {
        Self { step, app_id: app_id.into() }
    }

    pub fn bindings(&self) -> &'static [NodeBinding] {
        match self.step {
            StepKind::TryOn => TRY_ON_BINDINGS,
            StepKind::Background => BACKGROUND_BINDINGS,
            StepKind::Video => VIDEO_BINDINGS,
        }
    }

    /// Per-application polling deadline. Video generation is the slow
    /// path; the image apps finish well under their limits.
    pub fn timeout(&self) -> Duration {
        match self.step {
            StepKind::TryOn => Duration::from_secs(180),
            StepKind::Background => Duration::from_secs(120),
            StepKind::Video => Duration::from_secs(300),
        }
    }
}

/// Build the `nodeInfoList` payload from semantic parameters.
///
/// Bindings whose parameter is absent are skipped, which is how
/// optional inputs (e.g. the background image) fall away.
pub fn build_node_inputs(app: &AppConfig, params: &JobParams) -> Vec<NodeInfo> {
    app.bindings()
        .iter()
        .filter_map(|binding| {
            params.get(binding.param).map(|value| NodeInfo {
                node_id: binding.node_id,
                field_name: match binding.field_type {
                    FieldType::Image => "image",
                    FieldType::Text => binding.param,
                },
                field_value: value.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_bindings_submit_under_image_field() {
        let app = AppConfig::new(StepKind::TryOn, "app-1");
        let mut params = JobParams::new();
        params.insert("model_image".into(), "api/person.png".into());
        params.insert("clothing_image".into(), "api/shirt.png".into());

        let inputs = build_node_inputs(&app, &params);
        assert_eq!(inputs.len(), 2);
        assert!(inputs.iter().all(|n| n.field_name == "image"));
        assert!(inputs.iter().any(|n| n.node_id == "107" && n.field_value == "api/person.png"));
        assert!(inputs.iter().any(|n| n.node_id == "285" && n.field_value == "api/shirt.png"));
    }

    #[test]
    fn missing_optional_params_are_skipped() {
        let app = AppConfig::new(StepKind::Background, "app-2");
        let mut params = JobParams::new();
        params.insert("source_image".into(), "api/src.png".into());

        let inputs = build_node_inputs(&app, &params);
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].node_id, "441");
    }

    #[test]
    fn text_bindings_keep_their_param_name() {
        let app = AppConfig::new(StepKind::Video, "app-3");
        let mut params = JobParams::new();
        params.insert("person_image".into(), "api/p.png".into());
        params.insert("fps".into(), "30".into());

        let inputs = build_node_inputs(&app, &params);
        let fps = inputs.iter().find(|n| n.node_id == "fps_input").unwrap();
        assert_eq!(fps.field_name, "fps");
        assert_eq!(fps.field_value, "30");
    }

    #[test]
    fn node_info_serializes_camel_case() {
        let info = NodeInfo {
            node_id: "107",
            field_name: "image",
            field_value: "api/x.png".into(),
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"nodeId": "107", "fieldName": "image", "fieldValue": "api/x.png"}),
        );
    }
}
