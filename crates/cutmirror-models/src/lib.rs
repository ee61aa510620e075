//! Shared data models for the CutMirror pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Reference blueprints and their segments
//! - Beat-timestamp lookups shared by analysis and editing
//! - Clip library records and best moments
//! - Strategic advisor hints
//! - Edit decision lists (EDLs) and critiques
//! - Session progress events exchanged with external collaborators

pub mod beats;
pub mod blueprint;
pub mod clip;
pub mod critique;
pub mod edl;
pub mod error;
pub mod hints;
pub mod session;
pub mod tags;

pub use beats::{nearest_beat, snap_to_beat};
pub use blueprint::{Blueprint, Segment};
pub use clip::{BestMoment, ClipRecord, ClipSummary, LibrarySummary};
pub use critique::{Critique, CritiqueSource, SegmentSuggestion};
pub use edl::{EditDecision, EligibilityTier, Edl, MomentSource, ScoreBreakdown};
pub use error::{BlueprintError, ContinuityViolation, TagParseError};
pub use hints::{AdvisorHints, ConfidenceLevel, LibraryAssessment, ScoringOverrides};
pub use session::{JobResult, JobStatus, ProgressEvent, SessionId};
pub use tags::{ArcStage, AudioConfidence, CutOrigin, EnergyLevel, HoldType, MotionClass, NarrativeRole};
