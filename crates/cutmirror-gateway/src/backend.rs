//! Reasoning backend abstraction.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::credentials::Credential;
use crate::error::AnalysisResult;

/// What a request asks the reasoning service to do. Used for logging,
/// metrics labels and audit file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    ReferenceBlueprint,
    ClipAssessment,
    StrategicPlan,
    Reflection,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::ReferenceBlueprint => "reference-blueprint",
            TaskKind::ClipAssessment => "clip-assessment",
            TaskKind::StrategicPlan => "strategic-plan",
            TaskKind::Reflection => "reflection",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A media file sent along with the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAttachment {
    pub path: PathBuf,
    pub mime_type: String,
}

impl MediaAttachment {
    pub fn new(path: impl Into<PathBuf>, mime_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn video(path: impl Into<PathBuf>) -> Self {
        Self::new(path, "video/mp4")
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub task: TaskKind,
    pub prompt: String,
    pub media: Vec<MediaAttachment>,
    /// Changes whenever the prompt text changes, so cached answers to an
    /// older prompt are not reused
    pub prompt_version: u32,
}

impl AnalysisRequest {
    pub fn new(task: TaskKind, prompt: impl Into<String>) -> Self {
        Self {
            task,
            prompt: prompt.into(),
            media: Vec::new(),
            prompt_version: 1,
        }
    }

    pub fn with_media(mut self, media: MediaAttachment) -> Self {
        self.media.push(media);
        self
    }

    pub fn with_prompt_version(mut self, version: u32) -> Self {
        self.prompt_version = version;
        self
    }

    /// Same request with an extra instruction appended to the prompt.
    pub fn with_correction(&self, correction: &str) -> Self {
        let mut corrected = self.clone();
        corrected.prompt = format!("{}\n\n{}", self.prompt, correction);
        corrected
    }
}

/// One attempt against the reasoning service with a given credential.
///
/// Implementations map transport and service failures onto
/// [`crate::AnalysisErrorKind`]; retries and rotation are the gateway's job.
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, credential: &Credential, request: &AnalysisRequest) -> AnalysisResult<String>;
}
