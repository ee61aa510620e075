//! Cache configuration.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Root directory; safe to delete wholesale
    pub root: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".cutmirror-cache"),
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> Self {
        Self {
            root: std::env::var("CUTMIRROR_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| Self::default().root),
        }
    }
}
