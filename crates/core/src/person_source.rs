//! Person-input resolution for pipeline steps.
//!
//! Every step consumes a "person" input. Which artifact feeds it is
//! decided per step: the project's base model image, the nearest
//! upstream result of a compatible media type, or an automatic choice
//! between the two.

use crate::step::{StepKind, WorkflowConfig};
use crate::types::DbId;

/// Where a step's person input comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonSource {
    /// Prefer an upstream result when one exists, else the base image.
    Auto,
    /// Use the nearest upstream result, falling back to the base image
    /// only when no upstream artifact of a compatible type exists.
    Upstream,
    /// Always use the project's base model image, even when upstream
    /// results exist.
    BaseAsset,
}

impl PersonSource {
    pub fn as_str(self) -> &'static str {
        match self {
            PersonSource::Auto => "auto",
            PersonSource::Upstream => "upstream",
            PersonSource::BaseAsset => "base_asset",
        }
    }

    /// Parse a persisted mode. Unknown or absent values mean `Auto`.
    pub fn parse(value: Option<&str>) -> PersonSource {
        match value {
            Some("upstream") => PersonSource::Upstream,
            Some("base_asset") => PersonSource::BaseAsset,
            _ => PersonSource::Auto,
        }
    }
}

/// Artifact ids available to person-input resolution: the project's
/// base model image plus whatever each step has produced so far.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepArtifacts {
    pub base_person_image: Option<DbId>,
    pub try_on_result: Option<DbId>,
    pub background_result: Option<DbId>,
    pub video_result: Option<DbId>,
}

impl StepArtifacts {
    pub fn result_for(&self, step: StepKind) -> Option<DbId> {
        match step {
            StepKind::TryOn => self.try_on_result,
            StepKind::Background => self.background_result,
            StepKind::Video => self.video_result,
        }
    }
}

/// Resolve the artifact that feeds `step`'s person input.
///
/// Returns `None` only when neither a compatible upstream artifact nor
/// a base image exists; callers must treat that as a missing
/// precondition, not a transient state.
pub fn resolve_person_input(
    config: &WorkflowConfig,
    ordered: &[StepKind],
    step: StepKind,
    artifacts: &StepArtifacts,
) -> Option<DbId> {
    match config.person_source(step) {
        PersonSource::BaseAsset => artifacts.base_person_image,
        PersonSource::Upstream | PersonSource::Auto => {
            nearest_upstream(ordered, step, artifacts).or(artifacts.base_person_image)
        }
    }
}

/// The nearest preceding step in `ordered` whose output type matches
/// `step`'s input type and which has produced an artifact.
fn nearest_upstream(
    ordered: &[StepKind],
    step: StepKind,
    artifacts: &StepArtifacts,
) -> Option<DbId> {
    let index = ordered.iter().position(|s| *s == step)?;
    ordered[..index]
        .iter()
        .rev()
        .filter(|s| s.output_type() == step.input_type())
        .find_map(|s| artifacts.result_for(*s))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [StepKind; 3] = StepKind::CANONICAL_ORDER;

    fn config_with(step: StepKind, mode: PersonSource) -> WorkflowConfig {
        let mut cfg = WorkflowConfig {
            enable_try_on: true,
            enable_background: true,
            enable_video: true,
            step_order: ALL.to_vec(),
            try_on_person_source: PersonSource::Auto,
            background_person_source: PersonSource::Auto,
            video_person_source: PersonSource::Auto,
        };
        match step {
            StepKind::TryOn => cfg.try_on_person_source = mode,
            StepKind::Background => cfg.background_person_source = mode,
            StepKind::Video => cfg.video_person_source = mode,
        }
        cfg
    }

    #[test]
    fn upstream_prefers_nearest_matching_result() {
        let cfg = config_with(StepKind::Video, PersonSource::Upstream);
        let artifacts = StepArtifacts {
            base_person_image: Some(1),
            try_on_result: Some(10),
            background_result: Some(20),
            video_result: None,
        };
        assert_eq!(
            resolve_person_input(&cfg, &ALL, StepKind::Video, &artifacts),
            Some(20),
        );
    }

    #[test]
    fn upstream_skips_steps_without_artifacts() {
        let cfg = config_with(StepKind::Video, PersonSource::Upstream);
        let artifacts = StepArtifacts {
            base_person_image: Some(1),
            try_on_result: Some(10),
            background_result: None,
            video_result: None,
        };
        assert_eq!(
            resolve_person_input(&cfg, &ALL, StepKind::Video, &artifacts),
            Some(10),
        );
    }

    #[test]
    fn upstream_falls_back_to_base_image() {
        let cfg = config_with(StepKind::Background, PersonSource::Upstream);
        let artifacts = StepArtifacts {
            base_person_image: Some(1),
            ..Default::default()
        };
        assert_eq!(
            resolve_person_input(&cfg, &ALL, StepKind::Background, &artifacts),
            Some(1),
        );
    }

    #[test]
    fn upstream_skips_incompatible_output_types() {
        // Background after video: the video step's output is a video,
        // which cannot feed an image input.
        let order = [StepKind::TryOn, StepKind::Video, StepKind::Background];
        let cfg = config_with(StepKind::Background, PersonSource::Upstream);
        let artifacts = StepArtifacts {
            base_person_image: Some(1),
            try_on_result: Some(10),
            video_result: Some(30),
            ..Default::default()
        };
        assert_eq!(
            resolve_person_input(&cfg, &order, StepKind::Background, &artifacts),
            Some(10),
        );
    }

    #[test]
    fn base_asset_mode_ignores_upstream_results() {
        let cfg = config_with(StepKind::Background, PersonSource::BaseAsset);
        let artifacts = StepArtifacts {
            base_person_image: Some(1),
            try_on_result: Some(10),
            ..Default::default()
        };
        assert_eq!(
            resolve_person_input(&cfg, &ALL, StepKind::Background, &artifacts),
            Some(1),
        );
    }

    #[test]
    fn base_asset_mode_does_not_fall_back_upstream() {
        let cfg = config_with(StepKind::Background, PersonSource::BaseAsset);
        let artifacts = StepArtifacts {
            base_person_image: None,
            try_on_result: Some(10),
            ..Default::default()
        };
        assert_eq!(
            resolve_person_input(&cfg, &ALL, StepKind::Background, &artifacts),
            None,
        );
    }

    #[test]
    fn auto_mode_prefers_upstream_then_base() {
        let cfg = config_with(StepKind::Background, PersonSource::Auto);
        let with_upstream = StepArtifacts {
            base_person_image: Some(1),
            try_on_result: Some(10),
            ..Default::default()
        };
        let without_upstream = StepArtifacts {
            base_person_image: Some(1),
            ..Default::default()
        };
        assert_eq!(
            resolve_person_input(&cfg, &ALL, StepKind::Background, &with_upstream),
            Some(10),
        );
        assert_eq!(
            resolve_person_input(&cfg, &ALL, StepKind::Background, &without_upstream),
            Some(1),
        );
    }

    #[test]
    fn nothing_available_resolves_to_none() {
        let cfg = config_with(StepKind::TryOn, PersonSource::Auto);
        assert_eq!(
            resolve_person_input(&cfg, &ALL, StepKind::TryOn, &StepArtifacts::default()),
            None,
        );
    }

    #[test]
    fn parse_defaults_to_auto() {
        assert_eq!(PersonSource::parse(None), PersonSource::Auto);
        assert_eq!(PersonSource::parse(Some("auto")), PersonSource::Auto);
        assert_eq!(PersonSource::parse(Some("upstream")), PersonSource::Upstream);
        assert_eq!(PersonSource::parse(Some("base_asset")), PersonSource::BaseAsset);
        assert_eq!(PersonSource::parse(Some("try_on_result")), PersonSource::Auto);
    }
}
