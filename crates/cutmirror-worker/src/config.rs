//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Pipeline controller configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Directory for rendered outputs
    pub work_dir: PathBuf,
    /// Maximum sessions running at once
    pub max_concurrent_sessions: usize,
    /// Maximum clips analyzed concurrently
    pub clip_concurrency: usize,
    /// Upper bound for any single stage
    pub stage_timeout: Duration,
    /// Realize the EDL into a video file
    pub render_enabled: bool,
    /// Run the post-render reflection stage
    pub reflection_enabled: bool,
    /// Distance within which a blueprint boundary counts as a scene cut (seconds)
    pub scene_cut_tolerance: f64,
    /// Optional editor weights file (TOML/JSON/YAML)
    pub editor_config_path: Option<PathBuf>,
    /// How long a finished session stays queryable
    pub session_ttl: Duration,
    /// Finished sessions kept in memory at most; the oldest go first
    pub max_finished_sessions: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/cutmirror"),
            max_concurrent_sessions: 2,
            clip_concurrency: 4,
            stage_timeout: Duration::from_secs(900), // 15 minutes
            render_enabled: true,
            reflection_enabled: true,
            scene_cut_tolerance: 0.25,
            editor_config_path: None,
            session_ttl: Duration::from_secs(3600), // 1 hour
            max_finished_sessions: 200,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let flag = |name: &str, default: bool| {
            std::env::var(name)
                .ok()
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(default)
        };

        Self {
            work_dir: std::env::var("CUTMIRROR_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            max_concurrent_sessions: std::env::var("CUTMIRROR_MAX_SESSIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_sessions),
            clip_concurrency: std::env::var("CUTMIRROR_CLIP_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.clip_concurrency),
            stage_timeout: std::env::var("CUTMIRROR_STAGE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.stage_timeout),
            render_enabled: flag("CUTMIRROR_RENDER", defaults.render_enabled),
            reflection_enabled: flag("CUTMIRROR_REFLECTION", defaults.reflection_enabled),
            scene_cut_tolerance: std::env::var("CUTMIRROR_SCENE_CUT_TOLERANCE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.scene_cut_tolerance),
            editor_config_path: std::env::var("CUTMIRROR_EDITOR_CONFIG").ok().map(PathBuf::from),
            session_ttl: std::env::var("CUTMIRROR_SESSION_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_ttl),
            max_finished_sessions: std::env::var("CUTMIRROR_MAX_FINISHED_SESSIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_finished_sessions),
        }
    }
}
