//! Editor configuration.
//!
//! Every scoring weight and timing threshold lives here. Values can be
//! loaded from a TOML/JSON/YAML file and overridden through
//! `CUTMIRROR_EDITOR__*` environment variables, e.g.
//! `CUTMIRROR_EDITOR__COOLDOWN_SECONDS=3` or `CUTMIRROR_EDITOR__PACING__PEAK=1.0`.

use std::path::Path;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use cutmirror_models::{ArcStage, HoldType, ScoringOverrides};

use crate::error::{EditorError, EditorResult};

/// Base cut lengths per arc stage and multipliers per hold type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Base cut length in the intro (seconds)
    pub intro: f64,
    /// Base cut length while building up (seconds)
    pub build_up: f64,
    /// Base cut length at the peak (seconds)
    pub peak: f64,
    /// Base cut length in the outro (seconds)
    pub outro: f64,
    pub quick_multiplier: f64,
    pub standard_multiplier: f64,
    pub long_multiplier: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            intro: 2.5,
            build_up: 2.0,
            peak: 1.2,
            outro: 3.0,
            quick_multiplier: 0.5,
            standard_multiplier: 1.0,
            long_multiplier: 2.0,
        }
    }
}

impl PacingConfig {
    pub fn base_duration(&self, stage: ArcStage) -> f64 {
        match stage {
            ArcStage::Intro => self.intro,
            ArcStage::BuildUp => self.build_up,
            ArcStage::Peak => self.peak,
            ArcStage::Outro => self.outro,
        }
    }

    pub fn hold_multiplier(&self, hold: HoldType) -> f64 {
        match hold {
            HoldType::Quick => self.quick_multiplier,
            HoldType::Standard => self.standard_multiplier,
            HoldType::Long => self.long_multiplier,
        }
    }
}

/// Scoring weights and timing thresholds of the matching engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Bonus for a clip that has not been used yet.
    pub novelty_bonus: f64,

    /// Factor applied to the novelty bonus per prior use.
    ///
    /// - 0.0: novelty vanishes after the first placement
    /// - 0.5: halves with every placement (default)
    pub novelty_decay: f64,

    /// Bonus per vibe tag shared with the segment.
    pub vibe_weight: f64,

    /// Bonus when the clip's narrative roles serve the segment's arc stage.
    pub arc_weight: f64,

    /// Bonus when the clip's motion follows smoothly from the previous clip.
    pub transition_bonus: f64,

    /// Bonus when the strategic planner named the clip for this arc stage.
    pub advisor_bonus: f64,

    /// Bonus when the clip shows the blueprint's locked subject.
    pub subject_lock_bonus: f64,

    /// Bonus when the clip's overall energy equals the segment's.
    pub energy_exact_bonus: f64,

    /// Bonus when the clip's overall energy is merely compatible.
    pub energy_compatible_bonus: f64,

    /// Multiplier on the clip's 0..1 quality score.
    pub quality_weight: f64,

    /// Penalty per prior use of the clip in this run.
    pub usage_penalty: f64,

    /// Penalty for a clip placed within the trailing cooldown window.
    ///
    /// Clips outside the window are also strictly preferred over clips
    /// inside it, so this only orders candidates when all are cooling down.
    pub cooldown_penalty: f64,

    /// Length of the trailing cooldown window (seconds).
    pub cooldown_seconds: f64,

    /// Penalty for a clip tagged with a category the blueprint avoids.
    pub avoid_penalty: f64,

    /// Maximum relative jitter applied to target cut lengths (0.1 = ±10%).
    pub jitter: f64,

    /// Largest distance a boundary may move to land on a beat (seconds).
    pub beat_tolerance: f64,

    /// Shortest cut that beat snapping may produce (seconds).
    pub min_cut_duration: f64,

    /// Fixed RNG seed for reproducible jitter. Random when unset.
    pub seed: Option<u64>,

    pub pacing: PacingConfig,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            novelty_bonus: 3.0,
            novelty_decay: 0.5,
            vibe_weight: 1.5,
            arc_weight: 2.0,
            transition_bonus: 1.0,
            advisor_bonus: 2.5,
            subject_lock_bonus: 2.0,
            energy_exact_bonus: 1.0,
            energy_compatible_bonus: 0.4,
            quality_weight: 1.0,
            usage_penalty: 1.0,
            cooldown_penalty: 10.0,
            cooldown_seconds: 5.0,
            avoid_penalty: 5.0,
            jitter: 0.1,
            beat_tolerance: 0.15,
            min_cut_duration: 0.4,
            seed: None,
            pacing: PacingConfig::default(),
        }
    }
}

impl EditorConfig {
    /// Defaults, then the optional file, then `CUTMIRROR_EDITOR__*` variables.
    pub fn load(path: Option<&Path>) -> EditorResult<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let config: Self = builder
            .add_source(
                Environment::with_prefix("CUTMIRROR_EDITOR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Same config with the planner's overrides applied. Invalid override
    /// values are ignored.
    pub fn with_overrides(&self, overrides: &ScoringOverrides) -> Self {
        let usable = |v: Option<f64>| v.filter(|x| x.is_finite() && *x >= 0.0);
        let mut merged = self.clone();
        if let Some(v) = usable(overrides.advisor_bonus) {
            merged.advisor_bonus = v;
        }
        if let Some(v) = usable(overrides.vibe_weight) {
            merged.vibe_weight = v;
        }
        if let Some(v) = usable(overrides.novelty_bonus) {
            merged.novelty_bonus = v;
        }
        if let Some(v) = usable(overrides.cooldown_seconds) {
            merged.cooldown_seconds = v;
        }
        merged
    }

    pub fn validate(&self) -> EditorResult<()> {
        let weights = [
            ("novelty_bonus", self.novelty_bonus),
            ("novelty_decay", self.novelty_decay),
            ("vibe_weight", self.vibe_weight),
            ("arc_weight", self.arc_weight),
            ("transition_bonus", self.transition_bonus),
            ("advisor_bonus", self.advisor_bonus),
            ("subject_lock_bonus", self.subject_lock_bonus),
            ("energy_exact_bonus", self.energy_exact_bonus),
            ("energy_compatible_bonus", self.energy_compatible_bonus),
            ("quality_weight", self.quality_weight),
            ("usage_penalty", self.usage_penalty),
            ("cooldown_penalty", self.cooldown_penalty),
            ("cooldown_seconds", self.cooldown_seconds),
            ("avoid_penalty", self.avoid_penalty),
            ("beat_tolerance", self.beat_tolerance),
            ("min_cut_duration", self.min_cut_duration),
        ];
        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(EditorError::config(format!("{} must be a non-negative number, got {}", name, value)));
            }
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err(EditorError::config(format!("jitter must be in [0, 1), got {}", self.jitter)));
        }
        for stage in ArcStage::ALL {
            let base = self.pacing.base_duration(*stage);
            if !base.is_finite() || base <= 0.0 {
                return Err(EditorError::config(format!("pacing for {} must be positive", stage)));
            }
        }
        for hold in [HoldType::Quick, HoldType::Standard, HoldType::Long] {
            let m = self.pacing.hold_multiplier(hold);
            if !m.is_finite() || m <= 0.0 {
                return Err(EditorError::config("hold multipliers must be positive"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        assert!(EditorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_load_from_file_keeps_unset_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "cooldown_seconds = 2.5\nseed = 7\n\n[pacing]\npeak = 0.8").unwrap();

        let config = EditorConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.cooldown_seconds, 2.5);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.pacing.peak, 0.8);
        assert_eq!(config.pacing.intro, 2.5);
        assert_eq!(config.novelty_bonus, 3.0);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "jitter = 1.5").unwrap();
        assert!(matches!(
            EditorConfig::load(Some(file.path())),
            Err(EditorError::Config(_))
        ));
    }

    #[test]
    fn test_overrides_replace_only_valid_values() {
        let overrides = ScoringOverrides {
            advisor_bonus: Some(4.0),
            vibe_weight: Some(-1.0),
            novelty_bonus: None,
            cooldown_seconds: Some(f64::NAN),
        };
        let merged = EditorConfig::default().with_overrides(&overrides);
        assert_eq!(merged.advisor_bonus, 4.0);
        assert_eq!(merged.vibe_weight, 1.5);
        assert_eq!(merged.novelty_bonus, 3.0);
        assert_eq!(merged.cooldown_seconds, 5.0);
    }

    #[test]
    fn test_pacing_lookup() {
        let pacing = PacingConfig::default();
        assert_eq!(pacing.base_duration(ArcStage::Peak), 1.2);
        assert_eq!(pacing.hold_multiplier(HoldType::Long), 2.0);
    }
}
