//! Worker error types.

use cutmirror_cache::CacheError;
use cutmirror_editor::EditorError;
use cutmirror_gateway::AnalysisError;
use cutmirror_media::MediaError;
use cutmirror_models::SessionId;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Session {0} has no result yet")]
    NotReady(SessionId),

    #[error("Run cancelled")]
    Cancelled,

    #[error("{0}")]
    Editor(#[from] EditorError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkerError::Cancelled)
    }

    /// Errors caused by the submitted media rather than by this service.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            WorkerError::InvalidInput(_) | WorkerError::Editor(EditorError::EmptyClipPool)
        )
    }
}
