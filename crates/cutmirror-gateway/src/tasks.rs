//! Structured outputs requested from the reasoning service.

use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use cutmirror_models::{
    AdvisorHints, BestMoment, Blueprint, ClipRecord, Critique, CritiqueSource, EnergyLevel, MotionClass,
    NarrativeRole,
};

use crate::backend::TaskKind;
use crate::structured::StructuredOutput;

impl StructuredOutput for Blueprint {
    const TASK: TaskKind = TaskKind::ReferenceBlueprint;
    const REQUIRED_FIELDS: &'static [&'static str] = &[
        "segments",
        "segments[].start",
        "segments[].end",
        "segments[].energy",
    ];

    fn post_validate(&mut self) -> Result<(), String> {
        self.normalize();
        self.validate().map_err(|e| e.to_string())
    }
}

impl StructuredOutput for AdvisorHints {
    const TASK: TaskKind = TaskKind::StrategicPlan;
    const REQUIRED_FIELDS: &'static [&'static str] = &["arc_stage_clips"];
}

impl StructuredOutput for Critique {
    const TASK: TaskKind = TaskKind::Reflection;
    const REQUIRED_FIELDS: &'static [&'static str] = &["fidelity_score"];

    fn post_validate(&mut self) -> Result<(), String> {
        if !self.fidelity_score.is_finite() {
            return Err("fidelity_score must be a number in 0..1".to_string());
        }
        self.fidelity_score = self.fidelity_score.clamp(0.0, 1.0);
        self.source = CritiqueSource::External;
        Ok(())
    }
}

/// Semantic classification of one library clip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipAssessment {
    pub energy: EnergyLevel,

    #[serde(default)]
    pub motion: MotionClass,

    #[serde(default)]
    pub vibes: Vec<String>,

    #[serde(default)]
    pub roles: Vec<NarrativeRole>,

    #[serde(default)]
    pub content_categories: Vec<String>,

    #[serde(default)]
    pub subjects: Vec<String>,

    /// Technical quality in 0..1
    #[serde(default)]
    pub quality: Option<f64>,

    /// Best sub-range per energy tier, at most one per tier
    #[serde(default)]
    pub best_moments: Vec<BestMoment>,
}

impl StructuredOutput for ClipAssessment {
    const TASK: TaskKind = TaskKind::ClipAssessment;
    const REQUIRED_FIELDS: &'static [&'static str] = &[
        "energy",
        "best_moments[].energy",
        "best_moments[].start",
        "best_moments[].end",
    ];
}

impl ClipAssessment {
    pub fn into_record(self, id: impl Into<String>, path: impl Into<PathBuf>, duration: f64) -> ClipRecord {
        let mut record = ClipRecord::new(id, path, duration, self.energy);
        record.motion = self.motion;
        record.vibes = self.vibes;
        record.roles = self.roles;
        record.content_categories = self.content_categories;
        record.subjects = self.subjects;
        if let Some(quality) = self.quality {
            record.quality = quality;
        }
        record.best_moments = self.best_moments;
        record.sanitize();
        record
    }
}
