//! Media collaborators for the synthesis pipeline.
//!
//! Everything here shells out to FFmpeg/FFprobe:
//! - [`scene`]: physical scene-cut detection
//! - [`beat`]: tempo and beat-grid estimation from decoded audio
//! - [`normalize`]: analysis proxies and muted copies
//! - [`render`]: realizing an EDL into a video file
//!
//! Detectors and the renderer sit behind traits so the pipeline can be
//! driven by fakes in tests.

pub mod audio;
pub mod beat;
pub mod command;
pub mod error;
pub mod normalize;
pub mod probe;
pub mod render;
pub mod scene;

pub use beat::{BeatConfig, BeatDetector, BeatGrid, FfmpegBeatDetector};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use normalize::{FfmpegNormalizer, MediaNormalizer, ProxyConfig};
pub use probe::{probe_media, FfprobeProber, MediaInfo, MediaProber};
pub use render::{FfmpegRenderer, RenderConfig, Renderer};
pub use scene::{FfmpegSceneDetector, SceneConfig, SceneCutDetector};
