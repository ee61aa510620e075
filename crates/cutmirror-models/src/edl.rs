//! Edit decision list models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ContinuityViolation;
use crate::tags::{ArcStage, CutOrigin, EnergyLevel};

/// Where a decision's extraction window came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MomentSource {
    /// The clip's precomputed best moment for the tier
    BestMoment,
    /// Sequential coverage of the clip after its best moment ran out
    Sequential,
    /// Round-robin across the pool as a last resort
    RoundRobin,
}

/// Which rung of the eligibility ladder admitted the winning clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityTier {
    Exact,
    Compatible,
    Unrestricted,
}

/// Additive score components of the winning candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScoreBreakdown {
    pub novelty: f64,
    pub vibe_overlap: f64,
    pub arc_relevance: f64,
    pub transition_continuity: f64,
    pub advisor_bonus: f64,
    pub subject_lock_bonus: f64,
    pub energy_match: f64,
    pub quality: f64,
    pub usage_penalty: f64,
    pub cooldown_penalty: f64,
    pub avoid_penalty: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.novelty
            + self.vibe_overlap
            + self.arc_relevance
            + self.transition_continuity
            + self.advisor_bonus
            + self.subject_lock_bonus
            + self.energy_match
            + self.quality
            - self.usage_penalty
            - self.cooldown_penalty
            - self.avoid_penalty
    }
}

/// One placement on the output timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EditDecision {
    /// Sequence index in the EDL
    pub index: usize,
    /// Blueprint segment this decision fills
    pub segment_index: usize,
    pub timeline_start: f64,
    pub timeline_end: f64,
    /// Content hash of the source clip
    pub clip_id: String,
    pub source_path: PathBuf,
    pub source_start: f64,
    pub source_end: f64,
    /// Below 1.0 when the source window is shorter than the slot
    pub playback_rate: f64,
    /// Tier of the segment being satisfied
    pub energy: EnergyLevel,
    /// Tier of the material actually extracted
    pub source_energy: EnergyLevel,
    pub arc_stage: ArcStage,
    pub cut_origin: CutOrigin,
    pub moment_source: MomentSource,
    pub eligibility: EligibilityTier,
    pub beat_snapped: bool,
    pub score: ScoreBreakdown,
}

impl EditDecision {
    pub fn duration(&self) -> f64 {
        self.timeline_end - self.timeline_start
    }

    pub fn source_duration(&self) -> f64 {
        self.source_end - self.source_start
    }
}

/// The final, immutable edit decision list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Edl {
    pub decisions: Vec<EditDecision>,
    pub total_duration: f64,
}

impl Edl {
    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    /// Exact chaining check: the first decision starts at zero and every
    /// decision starts where its predecessor ends. No tolerance is applied.
    pub fn verify_continuity(&self) -> Result<(), ContinuityViolation> {
        let mut expected = 0.0;
        for (index, decision) in self.decisions.iter().enumerate() {
            if decision.timeline_start != expected {
                return Err(ContinuityViolation {
                    index,
                    expected,
                    found: decision.timeline_start,
                });
            }
            expected = decision.timeline_end;
        }
        if !self.decisions.is_empty() && expected != self.total_duration {
            return Err(ContinuityViolation {
                index: self.decisions.len(),
                expected: self.total_duration,
                found: expected,
            });
        }
        Ok(())
    }

    /// Timeline positions where one decision hands over to the next.
    pub fn cut_points(&self) -> Vec<f64> {
        self.decisions.iter().skip(1).map(|d| d.timeline_start).collect()
    }

    pub fn decisions_for_segment(&self, segment_index: usize) -> impl Iterator<Item = &EditDecision> {
        self.decisions.iter().filter(move |d| d.segment_index == segment_index)
    }
}
