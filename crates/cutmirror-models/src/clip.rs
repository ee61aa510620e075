//! Clip library models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::tags::{EnergyLevel, MotionClass, NarrativeRole};

/// A precomputed, energy-tagged window inside a source clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BestMoment {
    pub energy: EnergyLevel,
    /// Start inside the clip (seconds)
    pub start: f64,
    /// End inside the clip (seconds)
    pub end: f64,
    #[serde(default)]
    pub reason: String,
}

impl BestMoment {
    pub fn new(energy: EnergyLevel, start: f64, end: f64) -> Self {
        Self {
            energy,
            start,
            end,
            reason: String::new(),
        }
    }

    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// One user-supplied source clip.
///
/// `id` is the content hash of the clip's bytes, so renamed or moved files
/// resolve to the same record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipRecord {
    pub id: String,

    /// Location for this run. Not part of the cached identity.
    #[serde(default)]
    pub path: PathBuf,

    /// Duration in seconds
    pub duration: f64,

    pub energy: EnergyLevel,

    #[serde(default)]
    pub motion: MotionClass,

    #[serde(default)]
    pub vibes: Vec<String>,

    #[serde(default)]
    pub roles: Vec<NarrativeRole>,

    #[serde(default)]
    pub content_categories: Vec<String>,

    /// Subjects visible in the clip ("person", "dog", "car", ...)
    #[serde(default)]
    pub subjects: Vec<String>,

    /// Technical/aesthetic quality in 0..1
    #[serde(default = "default_quality")]
    pub quality: f64,

    /// At most one moment per energy tier
    #[serde(default)]
    pub best_moments: Vec<BestMoment>,

    /// Set when this record is a deterministic fallback rather than an analysis result.
    #[serde(default)]
    pub energy_only: bool,
}

fn default_quality() -> f64 {
    0.5
}

impl ClipRecord {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>, duration: f64, energy: EnergyLevel) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            duration,
            energy,
            motion: MotionClass::default(),
            vibes: Vec::new(),
            roles: Vec::new(),
            content_categories: Vec::new(),
            subjects: Vec::new(),
            quality: default_quality(),
            best_moments: Vec::new(),
            energy_only: false,
        }
    }

    /// Fallback classification built from local signals only.
    pub fn energy_only(id: impl Into<String>, path: impl Into<PathBuf>, duration: f64, energy: EnergyLevel) -> Self {
        let mut record = Self::new(id, path, duration, energy);
        record.best_moments = vec![BestMoment {
            energy,
            start: 0.0,
            end: duration,
            reason: "whole clip (energy-only classification)".to_string(),
        }];
        record.energy_only = true;
        record
    }

    pub fn with_moment(mut self, moment: BestMoment) -> Self {
        self.best_moments.retain(|m| m.energy != moment.energy);
        self.best_moments.push(moment);
        self
    }

    pub fn moment_for(&self, energy: EnergyLevel) -> Option<&BestMoment> {
        self.best_moments.iter().find(|m| m.energy == energy)
    }

    /// Whether this clip can supply material of the given tier, either as its
    /// overall energy or through a best moment.
    pub fn offers(&self, energy: EnergyLevel) -> bool {
        self.energy == energy || self.moment_for(energy).is_some()
    }

    /// Clamp best moments into the clip and drop unusable ones.
    pub fn sanitize(&mut self) {
        let duration = self.duration.max(0.0);
        self.quality = self.quality.clamp(0.0, 1.0);
        for moment in &mut self.best_moments {
            moment.start = moment.start.clamp(0.0, duration);
            moment.end = moment.end.clamp(0.0, duration);
        }
        self.best_moments.retain(|m| m.duration() > 0.0);
        let mut seen = Vec::new();
        self.best_moments.retain(|m| {
            if seen.contains(&m.energy) {
                false
            } else {
                seen.push(m.energy);
                true
            }
        });
    }
}

/// Compact description of one clip for strategic planning prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipSummary {
    pub id: String,
    pub duration: f64,
    pub energy: EnergyLevel,
    pub motion: MotionClass,
    pub vibes: Vec<String>,
    pub roles: Vec<NarrativeRole>,
    pub moment_tiers: Vec<EnergyLevel>,
}

/// Summary of the whole clip library.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LibrarySummary {
    pub clips: Vec<ClipSummary>,
}

impl LibrarySummary {
    pub fn from_records(records: &[ClipRecord]) -> Self {
        let mut clips: Vec<ClipSummary> = records
            .iter()
            .map(|r| ClipSummary {
                id: r.id.clone(),
                duration: r.duration,
                energy: r.energy,
                motion: r.motion,
                vibes: r.vibes.clone(),
                roles: r.roles.clone(),
                moment_tiers: r.best_moments.iter().map(|m| m.energy).collect(),
            })
            .collect();
        // Stable order so the planning cache key ignores submission order.
        clips.sort_by(|a, b| a.id.cmp(&b.id));
        Self { clips }
    }

    pub fn clip_ids(&self) -> impl Iterator<Item = &str> + Clone {
        self.clips.iter().map(|c| c.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offers_via_overall_energy_or_moment() {
        let clip = ClipRecord::new("a", "/a.mp4", 10.0, EnergyLevel::High)
            .with_moment(BestMoment::new(EnergyLevel::Medium, 2.0, 4.0));
        assert!(clip.offers(EnergyLevel::High));
        assert!(clip.offers(EnergyLevel::Medium));
        assert!(!clip.offers(EnergyLevel::Low));
    }

    #[test]
    fn test_sanitize_clamps_and_dedups_moments() {
        let mut clip = ClipRecord::new("a", "/a.mp4", 5.0, EnergyLevel::Low);
        clip.quality = 3.0;
        clip.best_moments = vec![
            BestMoment::new(EnergyLevel::Low, 4.0, 9.0),
            BestMoment::new(EnergyLevel::Low, 0.0, 1.0),
            BestMoment::new(EnergyLevel::High, 7.0, 8.0),
        ];
        clip.sanitize();
        assert_eq!(clip.quality, 1.0);
        assert_eq!(clip.best_moments.len(), 1);
        assert_eq!(clip.best_moments[0].end, 5.0);
    }

    #[test]
    fn test_library_summary_is_order_independent() {
        let a = ClipRecord::new("b-hash", "/x.mp4", 3.0, EnergyLevel::Low);
        let b = ClipRecord::new("a-hash", "/y.mp4", 4.0, EnergyLevel::High);
        let one = LibrarySummary::from_records(&[a.clone(), b.clone()]);
        let two = LibrarySummary::from_records(&[b, a]);
        assert_eq!(one, two);
        assert_eq!(one.clip_ids().collect::<Vec<_>>(), vec!["a-hash", "b-hash"]);
    }

    #[test]
    fn test_cached_record_without_path_deserializes() {
        let json = r#"{"id":"h","duration":2.0,"energy":"high"}"#;
        let record: ClipRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.quality, 0.5);
        assert!(record.path.as_os_str().is_empty());
    }
}
