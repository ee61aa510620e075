//! Strategic advisor hints.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::tags::ArcStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    #[default]
    Low,
    Medium,
    High,
}

/// How well the clip library covers the reference's needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LibraryAssessment {
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub gaps: Vec<String>,
    #[serde(default)]
    pub confidence: ConfidenceLevel,
}

/// Optional per-run adjustments to scoring weights.
///
/// Unset fields keep the configured weight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScoringOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advisor_bonus: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vibe_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub novelty_bonus: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_seconds: Option<f64>,
}

impl ScoringOverrides {
    pub fn is_empty(&self) -> bool {
        self.advisor_bonus.is_none()
            && self.vibe_weight.is_none()
            && self.novelty_bonus.is_none()
            && self.cooldown_seconds.is_none()
    }
}

/// Guidance produced once per (blueprint, clip library) pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AdvisorHints {
    /// Suggested clip ids per arc stage
    #[serde(default)]
    pub arc_stage_clips: BTreeMap<ArcStage, Vec<String>>,

    #[serde(default)]
    pub assessment: LibraryAssessment,

    #[serde(default)]
    pub overrides: ScoringOverrides,
}

impl AdvisorHints {
    /// No guidance: scoring proceeds on base signals only.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.arc_stage_clips.values().all(Vec::is_empty) && self.overrides.is_empty()
    }

    pub fn suggests(&self, stage: ArcStage, clip_id: &str) -> bool {
        self.arc_stage_clips
            .get(&stage)
            .is_some_and(|ids| ids.iter().any(|id| id == clip_id))
    }

    /// Drop suggestions naming clips outside the library.
    pub fn retain_known<'a>(&mut self, known: impl IntoIterator<Item = &'a str> + Clone) {
        for ids in self.arc_stage_clips.values_mut() {
            ids.retain(|id| known.clone().into_iter().any(|k| k == id.as_str()));
        }
    }
}
