//! Matching and scoring engine.
//!
//! Turns a [`Blueprint`](cutmirror_models::Blueprint) and a pool of
//! [`ClipRecord`](cutmirror_models::ClipRecord)s into an
//! [`Edl`](cutmirror_models::Edl) in a single forward pass:
//!
//! 1. pacing lays out cuts from arc stage and hold type, never splitting
//!    visual segments
//! 2. beats nudge boundaries when the audio was actually observed
//! 3. every eligible clip is scored and the best one wins
//! 4. the winner's best moment (or sequential coverage, or a round-robin
//!    fallback) supplies the source window
//! 5. each decision starts exactly where the previous one ended
//!
//! The engine does no I/O and owns all run state in [`MatchState`].

pub mod config;
pub mod engine;
pub mod error;
pub mod extraction;
pub mod pacing;
pub mod scoring;
pub mod state;

pub use config::{EditorConfig, PacingConfig};
pub use engine::{EditRequest, Editor};
pub use error::{EditorError, EditorResult};
pub use state::{ClipUsage, MatchState};
