//! Model-level validation errors.

use thiserror::Error;

/// Structural problems in a [`crate::Blueprint`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BlueprintError {
    #[error("blueprint has no segments")]
    Empty,

    #[error("segment {index} has non-positive duration ({start}..{end})")]
    EmptySegment { index: usize, start: f64, end: f64 },

    #[error("segment {index} starts at {found} but previous segment ends at {expected}")]
    Gap {
        index: usize,
        expected: f64,
        found: f64,
    },
}

/// Adjacent edit decisions fail to chain on the output timeline.
///
/// This is an internal invariant breach and is always fatal.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("timeline discontinuity at decision {index}: expected start {expected}, found {found}")]
pub struct ContinuityViolation {
    pub index: usize,
    pub expected: f64,
    pub found: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown {kind}: {value}")]
pub struct TagParseError {
    pub kind: &'static str,
    pub value: String,
}

impl TagParseError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
