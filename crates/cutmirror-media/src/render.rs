//! Realizing an EDL into pixels with hard cuts.

use std::path::Path;

use async_trait::async_trait;
use cutmirror_models::Edl;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub crf: u8,
    pub preset: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 30,
            crf: 20,
            preset: "medium".to_string(),
        }
    }
}

/// External cutter/concatenator.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render `edl` to `output`, laying `soundtrack`'s audio under the
    /// whole timeline when given.
    async fn render(&self, edl: &Edl, soundtrack: Option<&Path>, output: &Path) -> MediaResult<()>;
}

#[derive(Debug, Clone, Default)]
pub struct FfmpegRenderer {
    config: RenderConfig,
    runner: FfmpegRunner,
}

impl FfmpegRenderer {
    pub fn new(config: RenderConfig, runner: FfmpegRunner) -> Self {
        Self { config, runner }
    }

    /// One input per decision, each trimmed to its extraction window,
    /// retimed by its playback rate, conformed to the output raster and
    /// cut to its exact slot length, then concatenated.
    pub fn build_command(&self, edl: &Edl, soundtrack: Option<&Path>, output: &Path) -> MediaResult<FfmpegCommand> {
        if edl.is_empty() {
            return Err(MediaError::EmptyRender("EDL has no decisions".to_string()));
        }
        let c = &self.config;

        let mut inputs: Vec<&Path> = edl.decisions.iter().map(|d| d.source_path.as_path()).collect();
        let soundtrack_index = soundtrack.map(|s| {
            inputs.push(s);
            inputs.len() - 1
        });

        let mut filters = Vec::with_capacity(edl.len() + 1);
        for (i, d) in edl.decisions.iter().enumerate() {
            let rate = if d.playback_rate > 0.0 { d.playback_rate } else { 1.0 };
            filters.push(format!(
                "[{i}:v]trim=start={start:.3}:end={end:.3},setpts=(PTS-STARTPTS)/{rate:.4},\
                 scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,\
                 setsar=1,fps={fps},trim=duration={slot:.3},setpts=PTS-STARTPTS[v{i}]",
                i = i,
                start = d.source_start,
                end = d.source_end,
                rate = rate,
                w = c.width,
                h = c.height,
                fps = c.fps,
                slot = d.duration(),
            ));
        }
        let labels: String = (0..edl.len()).map(|i| format!("[v{}]", i)).collect();
        filters.push(format!("{}concat=n={}:v=1:a=0[outv]", labels, edl.len()));

        let mut cmd = FfmpegCommand::with_inputs(inputs, output)
            .filter_complex(filters.join(";"))
            .map("[outv]");
        cmd = match soundtrack_index {
            Some(idx) => cmd.map(format!("{}:a:0?", idx)).audio_codec("aac"),
            None => cmd.no_audio(),
        };
        Ok(cmd
            .video_codec("libx264")
            .preset(c.preset.clone())
            .crf(c.crf)
            .output_args(["-pix_fmt", "yuv420p"])
            .duration(edl.total_duration))
    }
}

#[async_trait]
impl Renderer for FfmpegRenderer {
    async fn render(&self, edl: &Edl, soundtrack: Option<&Path>, output: &Path) -> MediaResult<()> {
        let cmd = self.build_command(edl, soundtrack, output)?;
        self.runner.run(&cmd).await?;
        info!(
            output = %output.display(),
            decisions = edl.len(),
            duration = edl.total_duration,
            "EDL rendered"
        );
        Ok(())
    }
}
