//! Candidate eligibility and additive scoring.

use cutmirror_models::{
    AdvisorHints, Blueprint, ClipRecord, EligibilityTier, EnergyLevel, MotionClass, ScoreBreakdown, Segment,
};

use crate::config::EditorConfig;
use crate::state::ClipUsage;

/// Rung of the eligibility ladder at which `clip` may fill a segment of
/// tier `energy`, and the tier of material it would supply there.
///
/// `None` means the clip is only usable once no clip qualifies at all.
pub fn eligibility(clip: &ClipRecord, energy: EnergyLevel) -> Option<(EligibilityTier, EnergyLevel)> {
    if clip.offers(energy) {
        return Some((EligibilityTier::Exact, energy));
    }
    energy
        .compatible_fallbacks()
        .iter()
        .find(|tier| clip.offers(**tier))
        .map(|tier| (EligibilityTier::Compatible, *tier))
}

/// Everything scoring needs besides the clip itself.
pub struct ScoringContext<'a> {
    pub blueprint: &'a Blueprint,
    pub segment: &'a Segment,
    pub hints: &'a AdvisorHints,
    pub config: &'a EditorConfig,
    pub previous_motion: Option<MotionClass>,
    /// Timeline start of the slot being filled
    pub position: f64,
}

impl ScoringContext<'_> {
    pub fn score(&self, clip: &ClipRecord, usage: &ClipUsage) -> ScoreBreakdown {
        let config = self.config;
        let stage = self.segment.arc_stage;

        let shared_vibes = self
            .segment
            .vibes
            .iter()
            .filter(|v| clip.vibes.iter().any(|c| c.eq_ignore_ascii_case(v)))
            .count();

        let serves_stage = clip.roles.iter().any(|r| stage.preferred_roles().contains(r));

        let smooth = self
            .previous_motion
            .is_some_and(|previous| clip.motion.follows_smoothly(previous));

        let subject_locked = self
            .blueprint
            .subject_lock
            .as_deref()
            .is_some_and(|subject| clip.subjects.iter().any(|s| s.eq_ignore_ascii_case(subject)));

        let avoided = clip
            .content_categories
            .iter()
            .any(|c| self.blueprint.avoid.iter().any(|a| a.eq_ignore_ascii_case(c)));

        let energy_match = if clip.energy == self.segment.energy {
            config.energy_exact_bonus
        } else if self.segment.energy.accepts(clip.energy) {
            config.energy_compatible_bonus
        } else {
            0.0
        };

        ScoreBreakdown {
            novelty: config.novelty_bonus * config.novelty_decay.powi(usage.count as i32),
            vibe_overlap: config.vibe_weight * shared_vibes as f64,
            arc_relevance: if serves_stage { config.arc_weight } else { 0.0 },
            transition_continuity: if smooth { config.transition_bonus } else { 0.0 },
            advisor_bonus: if self.hints.suggests(stage, &clip.id) {
                config.advisor_bonus
            } else {
                0.0
            },
            subject_lock_bonus: if subject_locked { config.subject_lock_bonus } else { 0.0 },
            energy_match,
            quality: config.quality_weight * clip.quality.clamp(0.0, 1.0),
            usage_penalty: config.usage_penalty * usage.count as f64,
            cooldown_penalty: if self.in_cooldown(usage) {
                config.cooldown_penalty
            } else {
                0.0
            },
            avoid_penalty: if avoided { config.avoid_penalty } else { 0.0 },
        }
    }

    pub fn in_cooldown(&self, usage: &ClipUsage) -> bool {
        usage.in_cooldown(self.position, self.config.cooldown_seconds)
    }
}
