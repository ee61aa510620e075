//! Cache keys and on-disk layout.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CacheError, CacheResult};

/// Which tier an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePurpose {
    NormalizedMedia,
    StructuredAnalysis,
    StrategicPlan,
}

impl CachePurpose {
    pub const ALL: &'static [CachePurpose] = &[
        CachePurpose::NormalizedMedia,
        CachePurpose::StructuredAnalysis,
        CachePurpose::StrategicPlan,
    ];

    /// Directory name under the cache root.
    pub fn dir_name(&self) -> &'static str {
        match self {
            CachePurpose::NormalizedMedia => "normalized-media",
            CachePurpose::StructuredAnalysis => "structured-analysis",
            CachePurpose::StrategicPlan => "strategic-plan",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CachePurpose::NormalizedMedia => "normalized_media",
            CachePurpose::StructuredAnalysis => "structured_analysis",
            CachePurpose::StrategicPlan => "strategic_plan",
        }
    }
}

impl fmt::Display for CachePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `(content_hash, purpose, label, schema_version)`.
///
/// `label` separates several results of the same purpose derived from the
/// same bytes, e.g. a reference blueprint and its detected signals.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub content_hash: String,
    pub purpose: CachePurpose,
    pub label: String,
    pub schema_version: u32,
}

impl CacheKey {
    pub fn new(
        content_hash: impl Into<String>,
        purpose: CachePurpose,
        label: impl Into<String>,
        schema_version: u32,
    ) -> Self {
        Self {
            content_hash: content_hash.into(),
            purpose,
            label: label.into(),
            schema_version,
        }
    }

    pub fn analysis(content_hash: impl Into<String>, label: impl Into<String>, schema_version: u32) -> Self {
        Self::new(content_hash, CachePurpose::StructuredAnalysis, label, schema_version)
    }

    pub fn plan(content_hash: impl Into<String>, schema_version: u32) -> Self {
        Self::new(content_hash, CachePurpose::StrategicPlan, "advisor-hints", schema_version)
    }

    pub fn media(content_hash: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(content_hash, CachePurpose::NormalizedMedia, label, 1)
    }

    /// Reject keys that could escape their purpose directory.
    pub fn validate(&self) -> CacheResult<()> {
        let safe = |s: &str| {
            !s.is_empty()
                && s
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        };
        if !safe(&self.content_hash) {
            return Err(CacheError::invalid_key(format!("content hash '{}'", self.content_hash)));
        }
        if !safe(&self.label) {
            return Err(CacheError::invalid_key(format!("label '{}'", self.label)));
        }
        Ok(())
    }

    /// File name of the structured entry.
    ///
    /// Format: `{content_hash}.{label}.json.gz`
    pub fn entry_file_name(&self) -> String {
        format!("{}.{}.json.gz", self.content_hash, self.label)
    }

    /// File name of a media artifact.
    ///
    /// Format: `{content_hash}.{label}.{ext}`
    pub fn artifact_file_name(&self, ext: &str) -> String {
        format!("{}.{}.{}", self.content_hash, self.label, ext)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}.{}@v{}",
            self.purpose.dir_name(),
            self.content_hash,
            self.label,
            self.schema_version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_names() {
        let key = CacheKey::analysis("abc123", "clip-record", 2);
        assert_eq!(key.entry_file_name(), "abc123.clip-record.json.gz");
        assert_eq!(key.to_string(), "structured-analysis/abc123.clip-record@v2");
        assert_eq!(CacheKey::media("abc", "proxy").artifact_file_name("mp4"), "abc.proxy.mp4");
    }

    #[test]
    fn test_rejects_path_traversal() {
        assert!(CacheKey::analysis("../etc", "x", 1).validate().is_err());
        assert!(CacheKey::analysis("abc", "a/b", 1).validate().is_err());
        assert!(CacheKey::analysis("abc", "ok-label_1", 1).validate().is_ok());
    }
}
