//! Editor error types.

use cutmirror_models::{BlueprintError, ContinuityViolation};
use thiserror::Error;

pub type EditorResult<T> = Result<T, EditorError>;

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("no usable clips provided")]
    EmptyClipPool,

    #[error("invalid blueprint: {0}")]
    InvalidBlueprint(#[from] BlueprintError),

    #[error(transparent)]
    ContinuityViolation(#[from] ContinuityViolation),

    #[error("invalid editor configuration: {0}")]
    Config(String),
}

impl EditorError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Errors that must end the run rather than degrade it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EditorError::EmptyClipPool | EditorError::ContinuityViolation(_))
    }
}

impl From<config::ConfigError> for EditorError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
