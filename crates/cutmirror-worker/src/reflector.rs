//! Post-render reflection: an advisory critique of the finished edit.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use cutmirror_gateway::{AnalysisGateway, AnalysisRequest, MediaAttachment, TaskKind};
use cutmirror_media::BeatGrid;
use cutmirror_models::{AudioConfidence, Blueprint, Critique, Edl};

use crate::prompts;

pub struct Reflector {
    gateway: Arc<AnalysisGateway>,
    beat_tolerance: f64,
}

impl Reflector {
    pub fn new(gateway: Arc<AnalysisGateway>, beat_tolerance: f64) -> Self {
        Self { gateway, beat_tolerance }
    }

    /// Critique of `edl` against `blueprint`. Never touches the EDL.
    ///
    /// The rhythm metric is always computed locally; the external critique
    /// supplies the fidelity score and suggestions when available.
    pub async fn reflect(
        &self,
        rendered: Option<&Path>,
        blueprint: &Blueprint,
        edl: &Edl,
        beats: Option<&BeatGrid>,
        audio: AudioConfidence,
    ) -> Critique {
        let rhythm = match (audio, beats) {
            (AudioConfidence::Observed, Some(grid)) => grid.alignment_ratio(&edl.cut_points(), self.beat_tolerance),
            _ => None,
        };
        let local = local_fidelity(blueprint, edl);

        let mut request = AnalysisRequest::new(TaskKind::Reflection, prompts::reflection_prompt(blueprint, edl))
            .with_prompt_version(prompts::REFLECTION_PROMPT_VERSION);
        if let Some(path) = rendered {
            request = request.with_media(MediaAttachment::video(path));
        }

        let analyzed = self
            .gateway
            .analyze_or(&request, || Critique::local(local, rhythm))
            .await;
        let mut critique = analyzed.value;
        if rhythm.is_some() {
            critique.rhythm_alignment = rhythm;
        }

        info!(
            fidelity = critique.fidelity_score,
            rhythm = ?critique.rhythm_alignment,
            suggestions = critique.per_segment_suggestions.len(),
            source = ?critique.source,
            "Reflection complete"
        );
        critique
    }
}

/// Share of the timeline whose placed material matches the segment's
/// energy tier exactly.
pub fn local_fidelity(blueprint: &Blueprint, edl: &Edl) -> f64 {
    if edl.total_duration <= 0.0 {
        return 0.0;
    }
    let matched: f64 = edl
        .decisions
        .iter()
        .filter(|d| {
            blueprint
                .segments
                .get(d.segment_index)
                .is_some_and(|s| s.energy == d.source_energy)
        })
        .map(|d| d.duration())
        .sum();
    (matched / edl.total_duration).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutmirror_models::{
        ArcStage, CutOrigin, EditDecision, EligibilityTier, EnergyLevel, MomentSource, ScoreBreakdown, Segment,
    };

    fn decision(index: usize, start: f64, end: f64, source_energy: EnergyLevel) -> EditDecision {
        EditDecision {
            index,
            segment_index: index,
            timeline_start: start,
            timeline_end: end,
            clip_id: format!("clip-{}", index),
            source_path: format!("/clips/{}.mp4", index).into(),
            source_start: 0.0,
            source_end: end - start,
            playback_rate: 1.0,
            energy: EnergyLevel::High,
            source_energy,
            arc_stage: ArcStage::Peak,
            cut_origin: CutOrigin::Visual,
            moment_source: MomentSource::BestMoment,
            eligibility: EligibilityTier::Exact,
            beat_snapped: false,
            score: ScoreBreakdown::default(),
        }
    }

    #[test]
    fn test_local_fidelity_weights_by_duration() {
        let blueprint = Blueprint::new(vec![
            Segment::new(0.0, 3.0, EnergyLevel::High),
            Segment::new(3.0, 4.0, EnergyLevel::High),
        ]);
        let edl = Edl {
            decisions: vec![
                decision(0, 0.0, 3.0, EnergyLevel::High),
                decision(1, 3.0, 4.0, EnergyLevel::Medium),
            ],
            total_duration: 4.0,
        };
        assert!((local_fidelity(&blueprint, &edl) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_empty_edl_scores_zero() {
        let blueprint = Blueprint::new(Vec::new());
        assert_eq!(local_fidelity(&blueprint, &Edl::default()), 0.0);
    }
}
