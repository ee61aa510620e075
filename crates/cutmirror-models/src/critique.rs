//! Post-render critique.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SegmentSuggestion {
    pub segment_index: usize,
    pub suggestion: String,
}

/// Who produced the critique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum CritiqueSource {
    /// External review merged with local rhythm metrics
    External,
    /// Local metrics only; the external review was unavailable
    #[default]
    LocalOnly,
}

/// Advisory review of a rendered edit against its blueprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Critique {
    /// Structural/semantic fidelity to the reference in 0..1
    pub fidelity_score: f64,

    /// Fraction of cut points landing on a beat; `None` without observed audio
    #[serde(default)]
    pub rhythm_alignment: Option<f64>,

    #[serde(default)]
    pub per_segment_suggestions: Vec<SegmentSuggestion>,

    #[serde(default)]
    pub summary: String,

    #[serde(default)]
    pub source: CritiqueSource,
}

impl Critique {
    pub fn local(fidelity_score: f64, rhythm_alignment: Option<f64>) -> Self {
        Self {
            fidelity_score: fidelity_score.clamp(0.0, 1.0),
            rhythm_alignment,
            per_segment_suggestions: Vec::new(),
            summary: String::new(),
            source: CritiqueSource::LocalOnly,
        }
    }
}
