//! Categorical tags shared by blueprints, clips and decisions.
//!
//! The reasoning service is not consistent about casing, so every tag
//! accepts its capitalized spelling on deserialization as well.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TagParseError;

/// Energy tier of a segment, clip or moment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum EnergyLevel {
    #[serde(alias = "Low", alias = "LOW")]
    Low,
    #[default]
    #[serde(alias = "Medium", alias = "MEDIUM", alias = "med")]
    Medium,
    #[serde(alias = "High", alias = "HIGH")]
    High,
}

impl EnergyLevel {
    pub const ALL: &'static [EnergyLevel] = &[EnergyLevel::Low, EnergyLevel::Medium, EnergyLevel::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnergyLevel::Low => "low",
            EnergyLevel::Medium => "medium",
            EnergyLevel::High => "high",
        }
    }

    /// Whether a segment of this tier may be filled by material of `other`.
    ///
    /// High and Low never meet: Medium bridges both extremes.
    pub fn accepts(&self, other: EnergyLevel) -> bool {
        match self {
            EnergyLevel::Medium => true,
            EnergyLevel::High => matches!(other, EnergyLevel::High | EnergyLevel::Medium),
            EnergyLevel::Low => matches!(other, EnergyLevel::Low | EnergyLevel::Medium),
        }
    }

    /// Tiers this tier accepts other than itself, nearest first.
    pub fn compatible_fallbacks(&self) -> &'static [EnergyLevel] {
        match self {
            EnergyLevel::High | EnergyLevel::Low => &[EnergyLevel::Medium],
            EnergyLevel::Medium => &[EnergyLevel::High, EnergyLevel::Low],
        }
    }

    /// Map a 0..1 loudness/onset measure onto a tier.
    pub fn from_intensity(value: f64) -> Self {
        if value >= 0.66 {
            EnergyLevel::High
        } else if value >= 0.33 {
            EnergyLevel::Medium
        } else {
            EnergyLevel::Low
        }
    }
}

impl fmt::Display for EnergyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EnergyLevel {
    type Err = TagParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(EnergyLevel::Low),
            "medium" | "med" | "mid" => Ok(EnergyLevel::Medium),
            "high" => Ok(EnergyLevel::High),
            _ => Err(TagParseError::new("energy level", s)),
        }
    }
}

/// Camera/subject motion class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum MotionClass {
    #[serde(alias = "Static", alias = "STATIC")]
    Static,
    #[default]
    #[serde(alias = "Slow", alias = "SLOW", alias = "moderate")]
    Slow,
    #[serde(alias = "Dynamic", alias = "DYNAMIC", alias = "fast")]
    Dynamic,
}

impl MotionClass {
    fn rank(&self) -> u8 {
        match self {
            MotionClass::Static => 0,
            MotionClass::Slow => 1,
            MotionClass::Dynamic => 2,
        }
    }

    /// A cut between these two motion classes reads smoothly when they are
    /// at most one step apart.
    pub fn follows_smoothly(&self, previous: MotionClass) -> bool {
        self.rank().abs_diff(previous.rank()) <= 1
    }
}

/// Position of a segment in the reference's narrative arc.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum ArcStage {
    #[serde(alias = "Intro", alias = "INTRO")]
    Intro,
    #[default]
    #[serde(alias = "BuildUp", alias = "Build-up", alias = "build-up", alias = "buildup")]
    BuildUp,
    #[serde(alias = "Peak", alias = "PEAK", alias = "climax")]
    Peak,
    #[serde(alias = "Outro", alias = "OUTRO")]
    Outro,
}

impl ArcStage {
    pub const ALL: &'static [ArcStage] = &[ArcStage::Intro, ArcStage::BuildUp, ArcStage::Peak, ArcStage::Outro];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArcStage::Intro => "intro",
            ArcStage::BuildUp => "build_up",
            ArcStage::Peak => "peak",
            ArcStage::Outro => "outro",
        }
    }

    /// Narrative roles that serve this stage.
    pub fn preferred_roles(&self) -> &'static [NarrativeRole] {
        match self {
            ArcStage::Intro => &[NarrativeRole::Establishing, NarrativeRole::Detail],
            ArcStage::BuildUp => &[NarrativeRole::Action, NarrativeRole::Detail, NarrativeRole::Transition],
            ArcStage::Peak => &[NarrativeRole::Climax, NarrativeRole::Action, NarrativeRole::Reaction],
            ArcStage::Outro => &[NarrativeRole::Resolution, NarrativeRole::Establishing, NarrativeRole::Reaction],
        }
    }

    /// Stage for a normalized position (0..1) along a linear arc.
    pub fn at_position(position: f64) -> Self {
        if position < 0.2 {
            ArcStage::Intro
        } else if position < 0.6 {
            ArcStage::BuildUp
        } else if position < 0.85 {
            ArcStage::Peak
        } else {
            ArcStage::Outro
        }
    }
}

impl fmt::Display for ArcStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ArcStage {
    type Err = TagParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "intro" => Ok(ArcStage::Intro),
            "build_up" | "buildup" => Ok(ArcStage::BuildUp),
            "peak" | "climax" => Ok(ArcStage::Peak),
            "outro" => Ok(ArcStage::Outro),
            _ => Err(TagParseError::new("arc stage", s)),
        }
    }
}

/// How a segment boundary came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CutOrigin {
    /// Anchored to a detected physical scene cut. Never subdivided.
    #[serde(alias = "Visual", alias = "VISUAL")]
    Visual,
    /// Synthesized by the analysis; free to subdivide and beat-snap.
    #[serde(alias = "Inferred", alias = "INFERRED")]
    Inferred,
}

impl CutOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            CutOrigin::Visual => "visual",
            CutOrigin::Inferred => "inferred",
        }
    }
}

/// How long a shot should be held relative to its arc stage's base pace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum HoldType {
    #[serde(alias = "Quick", alias = "QUICK", alias = "rapid")]
    Quick,
    #[default]
    #[serde(alias = "Standard", alias = "STANDARD", alias = "normal")]
    Standard,
    #[serde(alias = "Long", alias = "LONG", alias = "lingering")]
    Long,
}

/// What a clip is useful for in a story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeRole {
    Establishing,
    Action,
    Reaction,
    Detail,
    Transition,
    Climax,
    Resolution,
    #[serde(other)]
    Other,
}

/// Whether rhythm data came from real audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AudioConfidence {
    Observed,
    #[default]
    Inferred,
}

impl AudioConfidence {
    /// Beat snapping is only trustworthy on observed audio.
    pub fn allows_beat_snapping(&self) -> bool {
        matches!(self, AudioConfidence::Observed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_energy_compatibility_excludes_opposite_extremes() {
        assert!(EnergyLevel::High.accepts(EnergyLevel::Medium));
        assert!(!EnergyLevel::High.accepts(EnergyLevel::Low));
        assert!(!EnergyLevel::Low.accepts(EnergyLevel::High));
        for level in EnergyLevel::ALL {
            assert!(EnergyLevel::Medium.accepts(*level));
        }
    }

    #[test]
    fn test_tags_accept_capitalized_spellings() {
        let energy: EnergyLevel = serde_json::from_str("\"HIGH\"").unwrap();
        assert_eq!(energy, EnergyLevel::High);
        let stage: ArcStage = serde_json::from_str("\"Build-up\"").unwrap();
        assert_eq!(stage, ArcStage::BuildUp);
        assert_eq!("build up".parse::<ArcStage>().unwrap(), ArcStage::BuildUp);
        assert!("loud".parse::<EnergyLevel>().is_err());
    }

    #[test]
    fn test_motion_smoothness() {
        assert!(MotionClass::Slow.follows_smoothly(MotionClass::Dynamic));
        assert!(!MotionClass::Static.follows_smoothly(MotionClass::Dynamic));
    }

    #[test]
    fn test_unknown_role_maps_to_other() {
        let role: NarrativeRole = serde_json::from_str("\"b_roll\"").unwrap();
        assert_eq!(role, NarrativeRole::Other);
    }
}
