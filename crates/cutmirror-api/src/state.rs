//! Application state.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use cutmirror_cache::{CacheConfig, ContentCache};
use cutmirror_editor::EditorConfig;
use cutmirror_gateway::{AnalysisGateway, GatewayConfig, GeminiBackend};
use cutmirror_media::{check_ffmpeg, check_ffprobe};
use cutmirror_worker::{Collaborators, JobService, PipelineController, WorkerConfig};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub jobs: JobService,
}

impl AppState {
    pub fn new(config: ApiConfig, jobs: JobService) -> Self {
        Self { config, jobs }
    }

    /// Build the full pipeline stack from environment variables.
    pub fn from_env(config: ApiConfig) -> anyhow::Result<Self> {
        for (tool, found) in [("ffmpeg", check_ffmpeg().is_ok()), ("ffprobe", check_ffprobe().is_ok())] {
            if !found {
                warn!(tool, "Not found on PATH; sessions will fail at pre-analysis");
            }
        }

        let cache = ContentCache::new(CacheConfig::from_env());
        let gateway_config = GatewayConfig::from_env();
        let backend = GeminiBackend::new(&gateway_config).context("Failed to create reasoning backend")?;
        let gateway = AnalysisGateway::new(Arc::new(backend), gateway_config).with_audit(Arc::new(cache.clone()));

        let worker_config = WorkerConfig::from_env();
        let editor_config =
            EditorConfig::load(worker_config.editor_config_path.as_deref()).context("Failed to load editor config")?;
        info!(
            cache_root = %cache.root().display(),
            work_dir = %worker_config.work_dir.display(),
            max_sessions = worker_config.max_concurrent_sessions,
            "Pipeline configured"
        );

        let controller = PipelineController::new(
            worker_config,
            editor_config,
            Collaborators::ffmpeg(Arc::new(gateway), cache),
        );
        Ok(Self::new(config, JobService::new(controller)))
    }
}
