//! Cut provenance: which blueprint segments are anchored to a physical
//! scene cut.

use serde::Serialize;

use cutmirror_media::BeatGrid;
use cutmirror_models::{Blueprint, CutOrigin};

/// Outcome of merging detected signals into a blueprint.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProvenanceReport {
    pub visual: usize,
    pub inferred: usize,
    /// Segments without an origin that were defaulted to visual
    pub defaulted: usize,
    /// Internal boundaries moved onto a detected scene cut
    pub snapped_to_scene: usize,
    /// Internal boundaries lying on a detected beat
    pub on_beat: usize,
    /// Scene detection was unavailable for this run
    pub detection_failed: bool,
}

impl ProvenanceReport {
    pub fn summary(&self) -> String {
        format!(
            "{} visual, {} inferred segments ({} defaulted, {} boundaries on scene cuts, {} on beats)",
            self.visual, self.inferred, self.defaulted, self.snapped_to_scene, self.on_beat
        )
    }
}

/// Assign every segment a cut origin.
///
/// With detected scene cuts, a segment is visual when both of its ends lie
/// within `tolerance` of a cut or of the timeline ends, and internal
/// boundaries close to a cut are moved onto it. Without detection the
/// origins given by the reasoning service are kept and any missing one
/// becomes visual. No segment leaves this function without an origin.
pub fn merge_cut_provenance(
    blueprint: &mut Blueprint,
    scene_cuts: Option<&[f64]>,
    beats: Option<&BeatGrid>,
    tolerance: f64,
) -> ProvenanceReport {
    let mut report = ProvenanceReport::default();

    match scene_cuts {
        Some(cuts) => {
            report.snapped_to_scene = snap_boundaries(blueprint, cuts, tolerance);
            let total = blueprint.total_duration;
            let anchored = |t: f64| {
                t.abs() <= tolerance
                    || (t - total).abs() <= tolerance
                    || cuts.iter().any(|c| (c - t).abs() <= tolerance)
            };
            for segment in &mut blueprint.segments {
                let origin = if anchored(segment.start) && anchored(segment.end) {
                    CutOrigin::Visual
                } else {
                    CutOrigin::Inferred
                };
                segment.cut_origin = Some(origin);
            }
        }
        None => {
            report.detection_failed = true;
            report.defaulted = blueprint.default_missing_origins();
        }
    }

    if let Some(grid) = beats {
        report.on_beat = blueprint
            .internal_boundaries()
            .iter()
            .filter(|b| grid.snap(**b, tolerance).is_some())
            .count();
    }

    for segment in &blueprint.segments {
        match segment.origin() {
            CutOrigin::Visual => report.visual += 1,
            CutOrigin::Inferred => report.inferred += 1,
        }
    }
    report
}

/// Move internal boundaries onto the nearest scene cut within `tolerance`
/// while keeping every segment non-empty.
fn snap_boundaries(blueprint: &mut Blueprint, cuts: &[f64], tolerance: f64) -> usize {
    let mut snapped = 0;
    for i in 1..blueprint.segments.len() {
        let boundary = blueprint.segments[i].start;
        let Some(cut) = cuts
            .iter()
            .copied()
            .filter(|c| (c - boundary).abs() <= tolerance)
            .min_by(|a, b| (a - boundary).abs().total_cmp(&(b - boundary).abs()))
        else {
            continue;
        };
        if cut == boundary {
            continue;
        }
        let lower = blueprint.segments[i - 1].start;
        let upper = blueprint.segments[i].end;
        if cut > lower && cut < upper {
            blueprint.segments[i - 1].end = cut;
            blueprint.segments[i].start = cut;
            snapped += 1;
        }
    }
    snapped
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutmirror_models::{EnergyLevel, Segment};

    fn blueprint(bounds: &[f64]) -> Blueprint {
        let segments = bounds
            .windows(2)
            .map(|w| Segment::new(w[0], w[1], EnergyLevel::Medium))
            .collect();
        Blueprint::new(segments)
    }

    #[test]
    fn test_segments_between_cuts_are_visual() {
        let mut bp = blueprint(&[0.0, 2.0, 3.5, 5.0, 6.5]);
        let report = merge_cut_provenance(&mut bp, Some(&[2.05, 5.0][..]), None, 0.25);

        let origins: Vec<CutOrigin> = bp.segments.iter().map(|s| s.origin()).collect();
        assert_eq!(
            origins,
            vec![CutOrigin::Visual, CutOrigin::Inferred, CutOrigin::Inferred, CutOrigin::Visual]
        );
        assert_eq!(bp.segments[0].end, 2.05);
        assert_eq!(bp.segments[1].start, 2.05);
        assert_eq!(report.snapped_to_scene, 1);
        assert_eq!(report.visual, 2);
        assert!(bp.validate().is_ok());
    }

    #[test]
    fn test_detection_failure_defaults_missing_origins_to_visual() {
        let mut bp = blueprint(&[0.0, 2.0, 5.0]);
        bp.segments[1].cut_origin = Some(CutOrigin::Inferred);

        let report = merge_cut_provenance(&mut bp, None, None, 0.25);

        assert!(report.detection_failed);
        assert_eq!(report.defaulted, 1);
        assert_eq!(bp.segments[0].cut_origin, Some(CutOrigin::Visual));
        assert_eq!(bp.segments[1].cut_origin, Some(CutOrigin::Inferred));
    }

    #[test]
    fn test_snap_never_empties_a_segment() {
        let mut bp = blueprint(&[0.0, 1.0, 1.1, 3.0]);
        merge_cut_provenance(&mut bp, Some(&[1.2][..]), None, 0.25);
        assert!(bp.segments.iter().all(|s| s.end > s.start));
    }

    #[test]
    fn test_beat_aligned_boundaries_are_counted() {
        let mut bp = blueprint(&[0.0, 2.0, 4.0]);
        let grid = BeatGrid {
            tempo_bpm: 120.0,
            beats: vec![0.5, 1.0, 1.5, 2.0, 2.5],
            confidence: 0.9,
        };
        let report = merge_cut_provenance(&mut bp, Some(&[][..]), Some(&grid), 0.1);
        assert_eq!(report.on_beat, 1);
        assert_eq!(report.inferred, 2);
    }
}
