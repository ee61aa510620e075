//! Duration-first pacing and beat alignment.
//!
//! Cut lengths come from the arc stage and hold type; beats only nudge
//! boundaries that already exist. Visual segments are never subdivided and
//! their boundaries never move.

use rand::Rng;
use tracing::debug;

use cutmirror_models::{snap_to_beat, Blueprint, Segment};

use crate::config::{EditorConfig, PacingConfig};

/// One slot on the output timeline, before a clip is chosen for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Cut {
    pub segment_index: usize,
    pub start: f64,
    pub end: f64,
    pub beat_snapped: bool,
}

impl Cut {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Target cut length for an inferred segment, jittered by up to ±`jitter`.
pub fn target_duration<R: Rng + ?Sized>(segment: &Segment, pacing: &PacingConfig, jitter: f64, rng: &mut R) -> f64 {
    let base = pacing.base_duration(segment.arc_stage) * pacing.hold_multiplier(segment.hold_type);
    if jitter > 0.0 {
        base * (1.0 + rng.random_range(-jitter..=jitter))
    } else {
        base
    }
}

/// Lay out every cut of the blueprint on the output timeline.
///
/// Consecutive cuts share the exact same `f64` boundary value, and the
/// first cut starts at exactly zero even when the first segment starts a
/// rounding error away from it.
pub fn plan_cuts<R: Rng + ?Sized>(
    blueprint: &Blueprint,
    beats: &[f64],
    beat_snapping: bool,
    config: &EditorConfig,
    rng: &mut R,
) -> Vec<Cut> {
    let segments = &blueprint.segments;
    if segments.is_empty() {
        return Vec::new();
    }
    let snapping = beat_snapping && !beats.is_empty();

    let mut boundaries = Vec::with_capacity(segments.len() + 1);
    let mut snapped = Vec::with_capacity(segments.len() + 1);
    boundaries.push(0.0);
    snapped.push(false);

    for i in 1..segments.len() {
        let previous = &segments[i - 1];
        let next = &segments[i];
        let original = previous.end;
        let mut boundary = original;
        let mut moved = false;

        if snapping && !previous.is_sacred() && !next.is_sacred() {
            if let Some(beat) = snap_to_beat(beats, original, config.beat_tolerance) {
                let floor = boundaries[i - 1] + config.min_cut_duration;
                let ceiling = next.end - config.min_cut_duration;
                if beat >= floor && beat <= ceiling {
                    boundary = beat;
                    moved = beat != original;
                }
            }
        }
        boundaries.push(boundary);
        snapped.push(moved);
    }
    boundaries.push(segments[segments.len() - 1].end);
    snapped.push(false);

    let mut cuts = Vec::new();
    for (index, segment) in segments.iter().enumerate() {
        let start = boundaries[index];
        let end = boundaries[index + 1];
        let span = end - start;

        if segment.is_sacred() {
            cuts.push(Cut {
                segment_index: index,
                start,
                end,
                beat_snapped: false,
            });
            continue;
        }

        let target = target_duration(segment, &config.pacing, config.jitter, rng);
        let count = ((span / target).floor() as usize).max(1);
        debug!(
            segment = index,
            span,
            target,
            count,
            "Subdividing inferred segment"
        );

        let even = |k: usize| if k == count { end } else { start + span * k as f64 / count as f64 };
        let mut cut_start = start;
        let mut start_snapped = snapped[index];
        for k in 1..=count {
            let mut cut_end = even(k);
            let mut end_snapped = if k == count { snapped[index + 1] } else { false };
            if k < count && snapping {
                if let Some(beat) = snap_to_beat(beats, cut_end, config.beat_tolerance) {
                    if beat - cut_start >= config.min_cut_duration && even(k + 1) - beat >= config.min_cut_duration {
                        end_snapped = beat != cut_end;
                        cut_end = beat;
                    }
                }
            }
            cuts.push(Cut {
                segment_index: index,
                start: cut_start,
                end: cut_end,
                beat_snapped: start_snapped || end_snapped,
            });
            cut_start = cut_end;
            start_snapped = end_snapped;
        }
    }
    cuts
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutmirror_models::{ArcStage, CutOrigin, EnergyLevel, HoldType};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn inferred(start: f64, end: f64, stage: ArcStage) -> Segment {
        Segment::new(start, end, EnergyLevel::Medium)
            .with_origin(CutOrigin::Inferred)
            .with_arc_stage(stage)
    }

    fn visual(start: f64, end: f64) -> Segment {
        Segment::new(start, end, EnergyLevel::Medium).with_origin(CutOrigin::Visual)
    }

    fn no_jitter() -> EditorConfig {
        EditorConfig {
            jitter: 0.0,
            ..EditorConfig::default()
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn test_target_duration_jitter_is_bounded() {
        let segment = inferred(0.0, 10.0, ArcStage::Peak);
        let pacing = PacingConfig::default();
        let mut rng = rng();
        for _ in 0..200 {
            let d = target_duration(&segment, &pacing, 0.1, &mut rng);
            assert!((1.08..=1.32).contains(&d), "{}", d);
        }
    }

    #[test]
    fn test_hold_type_scales_target() {
        let mut segment = inferred(0.0, 10.0, ArcStage::Intro);
        segment.hold_type = HoldType::Long;
        assert_eq!(target_duration(&segment, &PacingConfig::default(), 0.0, &mut rng()), 5.0);
    }

    #[test]
    fn test_visual_segment_is_one_cut() {
        let blueprint = Blueprint::new(vec![visual(0.0, 7.3)]);
        let cuts = plan_cuts(&blueprint, &[], false, &no_jitter(), &mut rng());
        assert_eq!(cuts.len(), 1);
        assert_eq!((cuts[0].start, cuts[0].end), (0.0, 7.3));
    }

    #[test]
    fn test_first_cut_is_anchored_at_zero() {
        let blueprint = Blueprint::new(vec![visual(5e-7, 2.0)]);
        assert!(blueprint.validate().is_ok());
        let cuts = plan_cuts(&blueprint, &[], false, &no_jitter(), &mut rng());
        assert_eq!((cuts[0].start, cuts[0].end), (0.0, 2.0));
    }

    #[test]
    fn test_inferred_segment_is_subdivided_evenly() {
        // Build-up base 2.0s: 6.0 / 2.0 = 3 cuts
        let blueprint = Blueprint::new(vec![inferred(0.0, 6.0, ArcStage::BuildUp)]);
        let cuts = plan_cuts(&blueprint, &[], false, &no_jitter(), &mut rng());
        assert_eq!(cuts.len(), 3);
        assert_eq!(cuts.last().unwrap().end, 6.0);
        for pair in cuts.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
            assert!((pair[0].duration() - 2.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_short_inferred_segment_keeps_one_cut() {
        let blueprint = Blueprint::new(vec![inferred(0.0, 0.7, ArcStage::Outro)]);
        assert_eq!(plan_cuts(&blueprint, &[], false, &no_jitter(), &mut rng()).len(), 1);
    }

    #[test]
    fn test_internal_cuts_snap_to_beats() {
        let blueprint = Blueprint::new(vec![inferred(0.0, 4.0, ArcStage::BuildUp)]);
        let beats = [0.0, 1.9, 4.0];
        let cuts = plan_cuts(&blueprint, &beats, true, &no_jitter(), &mut rng());
        assert_eq!(cuts.len(), 2);
        assert_eq!(cuts[0].end, 1.9);
        assert_eq!(cuts[1].start, 1.9);
        assert!(cuts[0].beat_snapped && cuts[1].beat_snapped);
    }

    #[test]
    fn test_no_snapping_without_observed_audio() {
        let blueprint = Blueprint::new(vec![inferred(0.0, 4.0, ArcStage::BuildUp)]);
        let cuts = plan_cuts(&blueprint, &[1.9], false, &no_jitter(), &mut rng());
        assert_eq!(cuts[0].end, 2.0);
        assert!(!cuts[0].beat_snapped);
    }

    #[test]
    fn test_boundary_next_to_visual_segment_never_moves() {
        let blueprint = Blueprint::new(vec![
            inferred(0.0, 2.0, ArcStage::Intro),
            visual(2.0, 3.0),
            inferred(3.0, 5.0, ArcStage::Outro),
        ]);
        let beats = [1.95, 2.05, 2.95, 3.05];
        let cuts = plan_cuts(&blueprint, &beats, true, &no_jitter(), &mut rng());
        let sacred: Vec<_> = cuts.iter().filter(|c| c.segment_index == 1).collect();
        assert_eq!(sacred.len(), 1);
        assert_eq!((sacred[0].start, sacred[0].end), (2.0, 3.0));
    }

    #[test]
    fn test_boundary_between_inferred_segments_snaps() {
        let blueprint = Blueprint::new(vec![
            inferred(0.0, 2.0, ArcStage::Intro),
            inferred(2.0, 4.0, ArcStage::Intro),
        ]);
        let cuts = plan_cuts(&blueprint, &[2.1], true, &no_jitter(), &mut rng());
        assert_eq!(cuts.len(), 2);
        assert_eq!(cuts[0].end, 2.1);
        assert_eq!(cuts[1].start, 2.1);
        assert_eq!(cuts[1].end, 4.0);
    }

    #[test]
    fn test_snap_respects_min_cut_duration() {
        let config = EditorConfig {
            min_cut_duration: 0.5,
            beat_tolerance: 0.5,
            ..no_jitter()
        };
        let blueprint = Blueprint::new(vec![
            inferred(0.0, 2.0, ArcStage::Intro),
            inferred(2.0, 2.6, ArcStage::Intro),
        ]);
        let cuts = plan_cuts(&blueprint, &[2.4], true, &config, &mut rng());
        assert_eq!(cuts[0].end, 2.0);
    }
}
