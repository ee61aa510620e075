//! Reference blueprint models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::BlueprintError;
use crate::tags::{ArcStage, CutOrigin, EnergyLevel, HoldType, MotionClass};

/// Boundaries closer than this are considered the same instant.
pub const BOUNDARY_EPSILON: f64 = 1e-6;

/// One timed, semantically tagged unit of a reference video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Segment {
    /// Start on the reference timeline (seconds)
    pub start: f64,

    /// End on the reference timeline (seconds)
    pub end: f64,

    pub energy: EnergyLevel,

    #[serde(default)]
    pub motion: MotionClass,

    /// Free-form semantic tags ("warm", "urban", "tense", ...)
    #[serde(default)]
    pub vibes: Vec<String>,

    #[serde(default)]
    pub arc_stage: ArcStage,

    /// Unset when upstream detection failed; see [`Segment::origin`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cut_origin: Option<CutOrigin>,

    #[serde(default)]
    pub hold_type: HoldType,

    #[serde(default)]
    pub reasoning: String,
}

impl Segment {
    pub fn new(start: f64, end: f64, energy: EnergyLevel) -> Self {
        Self {
            start,
            end,
            energy,
            motion: MotionClass::default(),
            vibes: Vec::new(),
            arc_stage: ArcStage::default(),
            cut_origin: None,
            hold_type: HoldType::default(),
            reasoning: String::new(),
        }
    }

    pub fn with_origin(mut self, origin: CutOrigin) -> Self {
        self.cut_origin = Some(origin);
        self
    }

    pub fn with_arc_stage(mut self, stage: ArcStage) -> Self {
        self.arc_stage = stage;
        self
    }

    pub fn with_vibes<I, S>(mut self, vibes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vibes = vibes.into_iter().map(Into::into).collect();
        self
    }

    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    /// Effective cut origin. A missing origin is treated as `Visual`, the
    /// non-subdividable choice.
    pub fn origin(&self) -> CutOrigin {
        self.cut_origin.unwrap_or(CutOrigin::Visual)
    }

    /// Sacred segments keep their exact span and are never split.
    pub fn is_sacred(&self) -> bool {
        self.origin() == CutOrigin::Visual
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }
}

/// The reference video's abstracted editorial plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Blueprint {
    /// Ordered, contiguous segments
    pub segments: Vec<Segment>,

    /// Total duration in seconds; recomputed by [`Blueprint::normalize`]
    #[serde(default)]
    pub total_duration: f64,

    #[serde(default)]
    pub editing_style: String,

    #[serde(default)]
    pub emotional_intent: String,

    #[serde(default)]
    pub narrative_message: String,

    /// Content categories the edit must include
    #[serde(default)]
    pub must_have: Vec<String>,

    #[serde(default)]
    pub should_have: Vec<String>,

    /// Content categories unsuitable for this edit
    #[serde(default)]
    pub avoid: Vec<String>,

    /// Subject category the narrative requires, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_lock: Option<String>,
}

impl Blueprint {
    pub fn new(segments: Vec<Segment>) -> Self {
        let total_duration = segments.last().map(|s| s.end).unwrap_or(0.0);
        Self {
            segments,
            total_duration,
            editing_style: String::new(),
            emotional_intent: String::new(),
            narrative_message: String::new(),
            must_have: Vec::new(),
            should_have: Vec::new(),
            avoid: Vec::new(),
            subject_lock: None,
        }
    }

    /// Check ordering and contiguity without modifying anything.
    pub fn validate(&self) -> Result<(), BlueprintError> {
        if self.segments.is_empty() {
            return Err(BlueprintError::Empty);
        }
        let mut expected = 0.0;
        for (index, segment) in self.segments.iter().enumerate() {
            if segment.end - segment.start <= BOUNDARY_EPSILON {
                return Err(BlueprintError::EmptySegment {
                    index,
                    start: segment.start,
                    end: segment.end,
                });
            }
            if (segment.start - expected).abs() > BOUNDARY_EPSILON {
                return Err(BlueprintError::Gap {
                    index,
                    expected,
                    found: segment.start,
                });
            }
            expected = segment.end;
        }
        Ok(())
    }

    /// Repair a blueprint returned by the reasoning service: sort by start,
    /// drop empty segments, close gaps and overlaps by moving each start
    /// onto the previous end, anchor the first segment at zero and recompute
    /// the total duration.
    pub fn normalize(&mut self) {
        self.segments
            .sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap_or(std::cmp::Ordering::Equal));
        self.segments.retain(|s| s.end.is_finite() && s.start.is_finite());

        let mut cursor = 0.0;
        let mut kept = Vec::with_capacity(self.segments.len());
        for mut segment in self.segments.drain(..) {
            segment.start = cursor;
            if segment.end - segment.start <= BOUNDARY_EPSILON {
                continue;
            }
            cursor = segment.end;
            kept.push(segment);
        }
        self.segments = kept;
        self.total_duration = cursor;
    }

    /// Give every segment lacking a cut origin the `Visual` origin.
    ///
    /// Returns how many segments were defaulted.
    pub fn default_missing_origins(&mut self) -> usize {
        let mut defaulted = 0;
        for segment in &mut self.segments {
            if segment.cut_origin.is_none() {
                segment.cut_origin = Some(CutOrigin::Visual);
                defaulted += 1;
            }
        }
        defaulted
    }

    /// Deterministic blueprint used when the reference cannot be analyzed.
    ///
    /// Detected scene cuts become visual boundaries; without any, the
    /// duration is split into four inferred segments following a linear
    /// intro/build/peak/outro arc.
    pub fn linear_arc(total_duration: f64, scene_cuts: &[f64]) -> Self {
        let total_duration = total_duration.max(0.0);
        let mut boundaries: Vec<f64> = scene_cuts
            .iter()
            .copied()
            .filter(|t| *t > BOUNDARY_EPSILON && *t < total_duration - BOUNDARY_EPSILON)
            .collect();
        boundaries.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        boundaries.dedup_by(|a, b| (*a - *b).abs() <= BOUNDARY_EPSILON);

        let origin = if boundaries.is_empty() {
            boundaries = (1..4).map(|i| total_duration * i as f64 / 4.0).collect();
            CutOrigin::Inferred
        } else {
            CutOrigin::Visual
        };

        let mut segments = Vec::with_capacity(boundaries.len() + 1);
        let mut start = 0.0;
        for end in boundaries.into_iter().chain(std::iter::once(total_duration)) {
            if end - start <= BOUNDARY_EPSILON {
                continue;
            }
            let midpoint = if total_duration > 0.0 {
                (start + end) / 2.0 / total_duration
            } else {
                0.0
            };
            let stage = ArcStage::at_position(midpoint);
            let energy = match stage {
                ArcStage::Intro | ArcStage::Outro => EnergyLevel::Low,
                ArcStage::BuildUp => EnergyLevel::Medium,
                ArcStage::Peak => EnergyLevel::High,
            };
            let mut segment = Segment::new(start, end, energy)
                .with_origin(origin)
                .with_arc_stage(stage);
            segment.reasoning = "linear arc fallback".to_string();
            segments.push(segment);
            start = end;
        }

        let mut blueprint = Blueprint::new(segments);
        blueprint.editing_style = "linear".to_string();
        blueprint
    }

    /// Boundaries between segments (excludes 0 and the total duration).
    pub fn internal_boundaries(&self) -> Vec<f64> {
        self.segments.iter().skip(1).map(|s| s.start).collect()
    }
}
