//! Analysis error types.

use std::fmt;
use thiserror::Error;

pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Failure classes of the reasoning service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisErrorKind {
    /// Quota exhausted for a credential (or, surfaced, for the whole pool)
    RateLimited,
    /// Response did not match the expected structure
    MalformedOutput,
    /// Content-safety refusal
    Blocked,
    /// Network failure, timeout, server error or misconfiguration
    Unavailable,
}

impl AnalysisErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisErrorKind::RateLimited => "rate_limited",
            AnalysisErrorKind::MalformedOutput => "malformed_output",
            AnalysisErrorKind::Blocked => "blocked",
            AnalysisErrorKind::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for AnalysisErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct AnalysisError {
    pub kind: AnalysisErrorKind,
    pub message: String,
    /// Raw response body, when there was one
    pub raw: Option<String>,
}

impl AnalysisError {
    pub fn new(kind: AnalysisErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            raw: None,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(AnalysisErrorKind::RateLimited, message)
    }

    pub fn malformed(message: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            raw: Some(raw.into()),
            ..Self::new(AnalysisErrorKind::MalformedOutput, message)
        }
    }

    pub fn blocked(message: impl Into<String>) -> Self {
        Self::new(AnalysisErrorKind::Blocked, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(AnalysisErrorKind::Unavailable, message)
    }

    pub fn is(&self, kind: AnalysisErrorKind) -> bool {
        self.kind == kind
    }

    /// Worth another attempt on the same or another credential.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, AnalysisErrorKind::RateLimited | AnalysisErrorKind::Unavailable)
    }
}

impl From<reqwest::Error> for AnalysisError {
    fn from(e: reqwest::Error) -> Self {
        if e.status().map(|s| s.as_u16()) == Some(429) {
            Self::rate_limited(e.to_string())
        } else {
            Self::unavailable(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(AnalysisError::rate_limited("x").is_retryable());
        assert!(AnalysisError::unavailable("x").is_retryable());
        assert!(!AnalysisError::blocked("x").is_retryable());
        assert!(!AnalysisError::malformed("x", "{").is_retryable());
    }

    #[test]
    fn test_display_includes_kind() {
        assert_eq!(AnalysisError::blocked("audio").to_string(), "blocked: audio");
    }
}
