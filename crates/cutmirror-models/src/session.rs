//! Session identifiers and the progress stream contract.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::blueprint::Blueprint;
use crate::critique::Critique;
use crate::edl::Edl;
use crate::hints::AdvisorHints;
use crate::tags::AudioConfidence;

/// Unique identifier for a synthesis session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Uploaded,
    Processing,
    Complete,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Uploaded => "uploaded",
            JobStatus::Processing => "processing",
            JobStatus::Complete => "complete",
            JobStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Error)
    }
}

/// One event on a session's progress stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProgressEvent {
    pub status: JobStatus,
    /// Fraction complete in 0..1, never decreasing within a session
    pub progress: f64,
    pub message: String,
    #[serde(default)]
    pub logs: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(status: JobStatus, progress: f64, message: impl Into<String>) -> Self {
        Self {
            status,
            progress: progress.clamp(0.0, 1.0),
            message: message.into(),
            logs: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn uploaded() -> Self {
        Self::new(JobStatus::Uploaded, 0.0, "Media received")
    }

    pub fn with_logs(mut self, logs: Vec<String>) -> Self {
        self.logs = logs;
        self
    }
}

/// Everything a finished session hands back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobResult {
    pub session_id: SessionId,
    pub edl: Edl,
    pub blueprint: Blueprint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critique: Option<Critique>,
    /// Rendered artifact, when a renderer was configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_path: Option<PathBuf>,
    #[serde(default)]
    pub hints: AdvisorHints,
    pub audio_confidence: AudioConfidence,
}
