//! Pipeline controller and job service for CutMirror.
//!
//! A session runs these stages in order:
//! 1. pre-analysis: scene cuts and beat grid of the reference
//! 2. reference analysis: the blueprint, with a muted retry on blocked audio
//! 3. clip analysis: one cached record per clip, with bounded concurrency
//! 4. strategic planning: advisory hints, never required
//! 5. semantic editing: the matching engine builds the EDL
//! 6. aesthetic styling and render
//! 7. reflection: an advisory critique of the result
//!
//! Cancellation is checked between stages and each stage runs under a
//! timeout.

pub mod analysis;
pub mod config;
pub mod error;
pub mod job;
pub mod logging;
pub mod pipeline;
pub mod planner;
pub mod progress;
pub mod prompts;
pub mod provenance;
pub mod reflector;

pub use analysis::{AnalyzedReference, Analyzer, Collaborators, ReferenceAnalysis, ReferenceSignals};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use job::JobService;
pub use logging::JobLogger;
pub use pipeline::{PipelineController, PipelineInput, Stage};
pub use planner::StrategicPlanner;
pub use progress::ProgressReporter;
pub use provenance::{merge_cut_provenance, ProvenanceReport};
pub use reflector::Reflector;

/// Metric names emitted by the worker.
pub mod names {
    pub const STAGE_DURATION: &str = "cutmirror_stage_duration_seconds";
    pub const SESSIONS_SUBMITTED: &str = "cutmirror_sessions_submitted_total";
    pub const SESSIONS_FINISHED: &str = "cutmirror_sessions_finished_total";
}
