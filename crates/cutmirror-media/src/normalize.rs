//! Normalized media derivatives: analysis proxies and muted copies.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Output height; width follows the aspect ratio
    pub height: u32,
    pub fps: u32,
    pub crf: u8,
    pub audio_bitrate: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            height: 360,
            fps: 15,
            crf: 30,
            audio_bitrate: "64k".to_string(),
        }
    }
}

/// Produces smaller derivatives of source media for upload to the
/// reasoning service.
#[async_trait]
pub trait MediaNormalizer: Send + Sync {
    /// Low-resolution H.264/AAC proxy.
    async fn proxy(&self, input: &Path, output: &Path) -> MediaResult<()>;

    /// Same video with every audio stream removed.
    async fn mute(&self, input: &Path, output: &Path) -> MediaResult<()>;
}

#[derive(Debug, Clone, Default)]
pub struct FfmpegNormalizer {
    config: ProxyConfig,
    runner: FfmpegRunner,
}

impl FfmpegNormalizer {
    pub fn new(config: ProxyConfig, runner: FfmpegRunner) -> Self {
        Self { config, runner }
    }

    fn proxy_command(&self, input: &Path, output: &Path) -> FfmpegCommand {
        FfmpegCommand::new(input, output)
            .video_filter(format!("scale=-2:{},fps={}", self.config.height, self.config.fps))
            .video_codec("libx264")
            .preset("veryfast")
            .crf(self.config.crf)
            .audio_codec("aac")
            .output_args(["-b:a", self.config.audio_bitrate.as_str(), "-movflags", "+faststart"])
    }
}

#[async_trait]
impl MediaNormalizer for FfmpegNormalizer {
    async fn proxy(&self, input: &Path, output: &Path) -> MediaResult<()> {
        self.runner.run(&self.proxy_command(input, output)).await?;
        info!(input = %input.display(), output = %output.display(), "Analysis proxy created");
        Ok(())
    }

    async fn mute(&self, input: &Path, output: &Path) -> MediaResult<()> {
        let cmd = FfmpegCommand::new(input, output).video_codec("copy").no_audio();
        self.runner.run(&cmd).await?;
        info!(input = %input.display(), output = %output.display(), "Muted copy created");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_command_scales_and_keeps_audio() {
        let normalizer = FfmpegNormalizer::default();
        let args = normalizer
            .proxy_command(Path::new("in.mov"), Path::new("out.mp4"))
            .build_args();
        assert!(args.contains(&"scale=-2:360,fps=15".to_string()));
        assert!(args.contains(&"aac".to_string()));
        assert!(!args.contains(&"-an".to_string()));
    }
}
