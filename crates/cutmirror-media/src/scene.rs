//! Physical scene-cut detection.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneConfig {
    /// FFmpeg scene score threshold (0..1)
    pub threshold: f64,
    /// Cuts closer than this to the previous cut are ignored (seconds)
    pub min_interval: f64,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            min_interval: 0.4,
        }
    }
}

/// Detector of hard cuts in a video.
#[async_trait]
pub trait SceneCutDetector: Send + Sync {
    /// Timestamps (seconds, ascending) of detected cuts. Zero is never
    /// reported as a cut.
    async fn detect(&self, media: &Path) -> MediaResult<Vec<f64>>;
}

/// `select='gt(scene,T)',showinfo` over the video stream.
#[derive(Debug, Clone, Default)]
pub struct FfmpegSceneDetector {
    config: SceneConfig,
    runner: FfmpegRunner,
}

impl FfmpegSceneDetector {
    pub fn new(config: SceneConfig, runner: FfmpegRunner) -> Self {
        Self { config, runner }
    }
}

#[async_trait]
impl SceneCutDetector for FfmpegSceneDetector {
    async fn detect(&self, media: &Path) -> MediaResult<Vec<f64>> {
        let cmd = FfmpegCommand::new(media, "-")
            .log_level("info")
            .video_filter(format!("select='gt(scene,{})',showinfo", self.config.threshold))
            .no_audio()
            .output_args(["-f", "null"]);

        let stderr = self.runner.run(&cmd).await?;
        let cuts = debounce(parse_showinfo_times(&stderr), self.config.min_interval);

        info!(media = %media.display(), cuts = cuts.len(), "Scene cuts detected");
        Ok(cuts)
    }
}

/// Extract `pts_time:` values from `showinfo` log lines.
pub fn parse_showinfo_times(log: &str) -> Vec<f64> {
    log.lines()
        .filter(|line| line.contains("Parsed_showinfo"))
        .filter_map(|line| {
            let rest = line.split("pts_time:").nth(1)?;
            rest.split_whitespace().next()?.parse::<f64>().ok()
        })
        .filter(|t| t.is_finite() && *t > 0.0)
        .collect()
}

/// Sort and drop cuts closer than `min_interval` to the previously kept cut.
pub fn debounce(mut cuts: Vec<f64>, min_interval: f64) -> Vec<f64> {
    cuts.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mut kept: Vec<f64> = Vec::with_capacity(cuts.len());
    for cut in cuts {
        if kept.last().map_or(cut >= min_interval, |last| cut - last >= min_interval) {
            kept.push(cut);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_showinfo() {
        let log = "\
[Parsed_showinfo_1 @ 0x55] n:   0 pts:  48048 pts_time:2.002   duration:1001
[Parsed_showinfo_1 @ 0x55] n:   1 pts: 120120 pts_time:5.005   duration:1001
frame=  2 fps=0.0 q=-0.0 Lsize=N/A time=00:00:05.00
[Parsed_showinfo_1 @ 0x55] n:   2 pts:      0 pts_time:0       duration:1001";
        assert_eq!(parse_showinfo_times(log), vec![2.002, 5.005]);
    }

    #[test]
    fn test_debounce_drops_close_cuts() {
        assert_eq!(debounce(vec![3.0, 1.0, 1.2, 0.1, 3.5], 0.4), vec![1.0, 3.0, 3.5]);
    }
}
