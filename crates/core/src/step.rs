//! Pipeline step identities and workflow ordering.
//!
//! A project chains up to three transformation steps: virtual try-on,
//! background replacement, and motion-transfer video. Each step has a
//! declared input and output media type; the type table drives upstream
//! artifact matching in [`crate::person_source`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::person_source::PersonSource;

/// Media category a step consumes or produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Image,
    Video,
}

/// The closed set of pipeline step kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    TryOn,
    Background,
    Video,
}

impl StepKind {
    /// Canonical ordering. Steps enabled after the stored order was
    /// written are appended in this order so they are never dropped.
    pub const CANONICAL_ORDER: [StepKind; 3] =
        [StepKind::TryOn, StepKind::Background, StepKind::Video];

    /// Stable string identifier used in persisted columns and the API.
    pub fn as_str(self) -> &'static str {
        match self {
            StepKind::TryOn => "try_on",
            StepKind::Background => "background",
            StepKind::Video => "video",
        }
    }

    /// Parse a persisted step identifier. Unknown strings yield `None`.
    pub fn parse(value: &str) -> Option<StepKind> {
        match value {
            "try_on" => Some(StepKind::TryOn),
            "background" => Some(StepKind::Background),
            "video" => Some(StepKind::Video),
            _ => None,
        }
    }

    /// Media type of the step's person input.
    pub fn input_type(self) -> MediaType {
        // Every current step is driven by a person image; the video step
        // additionally consumes a reference video, which is not subject
        // to upstream resolution.
        MediaType::Image
    }

    /// Media type of the artifact the step produces.
    pub fn output_type(self) -> MediaType {
        match self {
            StepKind::TryOn | StepKind::Background => MediaType::Image,
            StepKind::Video => MediaType::Video,
        }
    }

    /// Asset kind recorded on the step's result artifact.
    pub fn result_asset_kind(self) -> &'static str {
        match self {
            StepKind::TryOn => "try_on_result",
            StepKind::Background => "background_result",
            StepKind::Video => "video_result",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-project workflow configuration: which steps are enabled, their
/// stored order, and the person-source mode of each step.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub enable_try_on: bool,
    pub enable_background: bool,
    pub enable_video: bool,
    /// Stored step order. May lag behind the enablement flags when a
    /// step was toggled after the order was last written.
    pub step_order: Vec<StepKind>,
    pub try_on_person_source: PersonSource,
    pub background_person_source: PersonSource,
    pub video_person_source: PersonSource,
}

impl WorkflowConfig {
    pub fn is_enabled(&self, step: StepKind) -> bool {
        match step {
            StepKind::TryOn => self.enable_try_on,
            StepKind::Background => self.enable_background,
            StepKind::Video => self.enable_video,
        }
    }

    pub fn person_source(&self, step: StepKind) -> PersonSource {
        match step {
            StepKind::TryOn => self.try_on_person_source,
            StepKind::Background => self.background_person_source,
            StepKind::Video => self.video_person_source,
        }
    }

    /// The effective ordered list of enabled steps.
    ///
    /// The stored order is filtered to enabled steps (duplicates and
    /// disabled members removed); enabled steps missing from the stored
    /// order are appended in [`StepKind::CANONICAL_ORDER`]. Pure and
    /// deterministic: calling it twice on the same config yields the
    /// same list.
    pub fn ordered_steps(&self) -> Vec<StepKind> {
        let mut steps: Vec<StepKind> = Vec::with_capacity(3);
        for step in &self.step_order {
            if self.is_enabled(*step) && !steps.contains(step) {
                steps.push(*step);
            }
        }
        for step in StepKind::CANONICAL_ORDER {
            if self.is_enabled(step) && !steps.contains(&step) {
                steps.push(step);
            }
        }
        steps
    }
}
