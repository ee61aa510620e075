//! Reference and clip analysis with content-addressed caching.
//!
//! Every result is keyed by the SHA-256 of the input bytes plus the prompt
//! version, so a second run over identical media issues no reasoning calls.
//! Fallback results are returned but never cached.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use cutmirror_cache::{hash_file, CacheKey, Computed, ContentCache, LookupRequest};
use cutmirror_gateway::{
    AnalysisError, AnalysisGateway, AnalysisRequest, ClipAssessment, MediaAttachment, TaskKind,
};
use cutmirror_media::{
    BeatDetector, BeatGrid, FfmpegBeatDetector, FfmpegNormalizer, FfmpegRenderer, FfmpegSceneDetector,
    FfprobeProber, MediaError, MediaNormalizer, MediaProber, MediaResult, Renderer, SceneCutDetector,
};
use cutmirror_models::{AudioConfidence, Blueprint, ClipRecord, EnergyLevel};

use crate::error::{WorkerError, WorkerResult};
use crate::prompts;

/// Version of the locally detected signals payload.
pub const SIGNALS_VERSION: u32 = 1;

/// Scene cuts per second at which a clip counts as fully energetic when
/// only local signals are available.
const HIGH_ENERGY_CUT_RATE: f64 = 0.5;

const PROXY_EXT: &str = "mp4";

/// Everything the pipeline talks to outside its own process.
#[derive(Clone)]
pub struct Collaborators {
    pub prober: Arc<dyn MediaProber>,
    pub normalizer: Arc<dyn MediaNormalizer>,
    pub scenes: Arc<dyn SceneCutDetector>,
    pub beats: Arc<dyn BeatDetector>,
    pub renderer: Arc<dyn Renderer>,
    pub gateway: Arc<AnalysisGateway>,
    pub cache: ContentCache,
}

impl Collaborators {
    /// FFmpeg-backed media tooling with default settings.
    pub fn ffmpeg(gateway: Arc<AnalysisGateway>, cache: ContentCache) -> Self {
        Self {
            prober: Arc::new(FfprobeProber),
            normalizer: Arc::new(FfmpegNormalizer::default()),
            scenes: Arc::new(FfmpegSceneDetector::default()),
            beats: Arc::new(FfmpegBeatDetector::default()),
            renderer: Arc::new(FfmpegRenderer::default()),
            gateway,
            cache,
        }
    }
}

/// Locally detected signals of the reference.
///
/// `None` means the detector failed, which is different from detecting
/// nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSignals {
    pub duration: f64,
    pub has_audio: bool,
    pub scene_cuts: Option<Vec<f64>>,
    pub beat_grid: Option<BeatGrid>,
}

impl ReferenceSignals {
    pub fn beats(&self) -> &[f64] {
        self.beat_grid.as_ref().map_or(&[], |g| g.beats.as_slice())
    }
}

/// Structured result of the reference analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceAnalysis {
    pub blueprint: Blueprint,
    /// The service only accepted the reference without its audio
    pub audio_muted: bool,
}

/// Reference media with its identity and signals.
#[derive(Debug, Clone)]
pub struct AnalyzedReference {
    pub content_hash: String,
    pub path: PathBuf,
    pub signals: ReferenceSignals,
    pub analysis: ReferenceAnalysis,
}

impl AnalyzedReference {
    /// Beat snapping is allowed only when rhythm came from the real audio.
    pub fn audio_confidence(&self) -> AudioConfidence {
        if self.signals.has_audio && !self.analysis.audio_muted && !self.signals.beats().is_empty() {
            AudioConfidence::Observed
        } else {
            AudioConfidence::Inferred
        }
    }
}

/// Analysis services shared by the pipeline stages.
#[derive(Clone)]
pub struct Analyzer {
    collaborators: Collaborators,
}

impl Analyzer {
    pub fn new(collaborators: Collaborators) -> Self {
        Self { collaborators }
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    fn cache(&self) -> &ContentCache {
        &self.collaborators.cache
    }

    /// Probe the reference and detect its scene cuts and beat grid.
    pub async fn reference_signals(&self, path: &Path) -> WorkerResult<(String, ReferenceSignals)> {
        let content_hash = hash_file(path).await?;
        let key = CacheKey::analysis(&content_hash, "signals", SIGNALS_VERSION);

        let signals = self
            .cache()
            .get_or_compute::<ReferenceSignals, WorkerError, _, _>(&key, || async {
                let info = self.collaborators.prober.probe(path).await?;
                if info.duration <= 0.0 {
                    return Err(MediaError::invalid_media(format!(
                        "reference {} has no duration",
                        path.display()
                    ))
                    .into());
                }

                let scene_cuts = match self.collaborators.scenes.detect(path).await {
                    Ok(cuts) => Some(cuts),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Scene detection failed");
                        None
                    }
                };

                let mut beats_failed = false;
                let beat_grid = if info.has_audio {
                    match self.collaborators.beats.detect(path).await {
                        Ok(grid) => grid,
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "Beat detection failed");
                            beats_failed = true;
                            None
                        }
                    }
                } else {
                    None
                };

                let signals = ReferenceSignals {
                    duration: info.duration,
                    has_audio: info.has_audio,
                    scene_cuts,
                    beat_grid,
                };
                if signals.scene_cuts.is_none() || beats_failed {
                    Ok(Computed::Fallback(signals))
                } else {
                    Ok(Computed::Fresh(signals))
                }
            })
            .await?;

        info!(
            hash = %short(&content_hash),
            duration = signals.duration,
            scene_cuts = signals.scene_cuts.as_ref().map(|c| c.len()),
            beats = signals.beats().len(),
            "Reference signals ready"
        );
        Ok((content_hash, signals))
    }

    /// Blueprint of the reference.
    ///
    /// Tries the original audio first and a muted copy only when the
    /// service blocks it. Any failure ends in a linear-arc blueprint built
    /// from the detected scene cuts; that fallback is not cached.
    pub async fn reference_blueprint(
        &self,
        path: &Path,
        content_hash: &str,
        signals: &ReferenceSignals,
    ) -> WorkerResult<ReferenceAnalysis> {
        let key = CacheKey::analysis(content_hash, TaskKind::ReferenceBlueprint.as_str(), prompts::REFERENCE_PROMPT_VERSION);
        let scene_cuts = signals.scene_cuts.clone().unwrap_or_default();
        let fallback = || Blueprint::linear_arc(signals.duration, &scene_cuts);

        let prompt = prompts::reference_prompt(signals.duration, &scene_cuts);
        let request_for = |media: &Path| {
            AnalysisRequest::new(TaskKind::ReferenceBlueprint, prompt.clone())
                .with_media(MediaAttachment::video(media))
                .with_prompt_version(prompts::REFERENCE_PROMPT_VERSION)
        };

        self.cache()
            .lookup_or_compute::<ReferenceAnalysis, WorkerError, _, _>(by_name(&key, path), || async {
                let upload = self.proxy_for(path, content_hash).await;
                let request = request_for(&upload);

                let muted = || async {
                    let source: &Path = &upload;
                    let muted_path = self
                        .ensure_artifact(&CacheKey::media(content_hash, "muted"), PROXY_EXT, |out| async move {
                            self.collaborators.normalizer.mute(source, &out).await
                        })
                        .await
                        .map_err(|e| AnalysisError::unavailable(format!("could not build muted copy: {}", e)))?;
                    Ok(request_for(&muted_path))
                };

                let outcome = self
                    .collaborators
                    .gateway
                    .analyze_with_audio_fallback::<Blueprint, _, _, _>(&request, muted, fallback)
                    .await;

                Ok(match outcome {
                    Ok((analyzed, confidence)) => {
                        let audio_muted = confidence == AudioConfidence::Inferred;
                        analyzed
                            .into_computed()
                            .map(|blueprint| ReferenceAnalysis { blueprint, audio_muted })
                    }
                    Err(e) => {
                        warn!(error = %e, "Reference analysis failed, using linear arc");
                        Computed::Fallback(ReferenceAnalysis {
                            blueprint: fallback(),
                            audio_muted: false,
                        })
                    }
                })
            })
            .await
    }

    /// Reference hash, signals and blueprint in one call.
    pub async fn analyze_reference(&self, path: &Path) -> WorkerResult<AnalyzedReference> {
        let (content_hash, signals) = self.reference_signals(path).await?;
        let analysis = self.reference_blueprint(path, &content_hash, &signals).await?;
        Ok(AnalyzedReference {
            content_hash,
            path: path.to_path_buf(),
            signals,
            analysis,
        })
    }

    /// Records for every analyzable clip, in submission order.
    ///
    /// Byte-identical uploads are collapsed before any analysis. Clips that
    /// cannot be read or probed are skipped.
    pub async fn analyze_clips(&self, paths: &[PathBuf], concurrency: usize) -> Vec<ClipRecord> {
        let concurrency = concurrency.max(1);
        let hashed: Vec<(PathBuf, WorkerResult<String>)> = stream::iter(paths.iter().cloned())
            .map(|path| async move {
                let hash = hash_file(&path).await.map_err(WorkerError::from);
                (path, hash)
            })
            .buffered(concurrency)
            .collect()
            .await;

        let mut unique: Vec<(PathBuf, String)> = Vec::with_capacity(hashed.len());
        for (path, hash) in hashed {
            match hash {
                Ok(hash) if unique.iter().any(|(_, h)| *h == hash) => {
                    debug!(path = %path.display(), id = %short(&hash), "Duplicate clip upload ignored");
                }
                Ok(hash) => unique.push((path, hash)),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable clip"),
            }
        }

        let results: Vec<(PathBuf, WorkerResult<ClipRecord>)> = stream::iter(unique)
            .map(|(path, hash)| async move {
                let result = self.clip_record(&path, &hash).await;
                (path, result)
            })
            .buffered(concurrency)
            .collect()
            .await;

        results
            .into_iter()
            .filter_map(|(path, result)| match result {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unusable clip");
                    None
                }
            })
            .collect()
    }

    /// Record for one clip, from cache or the reasoning service.
    pub async fn analyze_clip(&self, path: &Path) -> WorkerResult<ClipRecord> {
        let content_hash = hash_file(path).await?;
        self.clip_record(path, &content_hash).await
    }

    async fn clip_record(&self, path: &Path, content_hash: &str) -> WorkerResult<ClipRecord> {
        let key = CacheKey::analysis(content_hash, TaskKind::ClipAssessment.as_str(), prompts::CLIP_PROMPT_VERSION);

        let mut record: ClipRecord = self
            .cache()
            .lookup_or_compute::<ClipRecord, WorkerError, _, _>(by_name(&key, path), || async {
                let info = self.collaborators.prober.probe(path).await?;
                if info.duration <= 0.0 {
                    return Err(MediaError::invalid_media(format!("clip {} has no duration", path.display())).into());
                }

                let upload = self.proxy_for(path, content_hash).await;
                let request = AnalysisRequest::new(TaskKind::ClipAssessment, prompts::clip_prompt(info.duration))
                    .with_media(MediaAttachment::video(&upload))
                    .with_prompt_version(prompts::CLIP_PROMPT_VERSION);

                let failure = match self
                    .collaborators
                    .gateway
                    .analyze::<ClipAssessment, _>(&request, ClipAssessment::default)
                    .await
                {
                    Ok(analyzed) if !analyzed.is_fallback() => {
                        let record = analyzed.value.into_record(content_hash, path, info.duration);
                        return Ok(Computed::Fresh(record));
                    }
                    Ok(analyzed) => analyzed.failure.map(|e| e.to_string()).unwrap_or_default(),
                    Err(e) => e.to_string(),
                };

                let energy = self.estimate_energy(path, info.duration).await;
                info!(
                    path = %path.display(),
                    energy = %energy,
                    reason = %failure,
                    "Using energy-only classification"
                );
                Ok(Computed::Fallback(ClipRecord::energy_only(
                    content_hash,
                    path,
                    info.duration,
                    energy,
                )))
            })
            .await?;

        // Cached records are path-independent.
        record.path = path.to_path_buf();
        Ok(record)
    }

    /// Energy tier from scene-cut density alone.
    async fn estimate_energy(&self, path: &Path, duration: f64) -> EnergyLevel {
        match self.collaborators.scenes.detect(path).await {
            Ok(cuts) if duration > 0.0 => {
                let rate = cuts.len() as f64 / duration;
                EnergyLevel::from_intensity((rate / HIGH_ENERGY_CUT_RATE).min(1.0))
            }
            Ok(_) => EnergyLevel::default(),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Scene detection failed for energy estimate");
                EnergyLevel::default()
            }
        }
    }

    /// Cached analysis proxy, or the original when it cannot be built.
    async fn proxy_for(&self, path: &Path, content_hash: &str) -> PathBuf {
        let key = CacheKey::media(content_hash, "proxy");
        match self
            .ensure_artifact(&key, PROXY_EXT, |out| async move {
                self.collaborators.normalizer.proxy(path, &out).await
            })
            .await
        {
            Ok(proxy) => proxy,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Proxy unavailable, uploading original");
                path.to_path_buf()
            }
        }
    }

    /// Existing artifact for `key`, or one produced into a staged file and
    /// committed atomically.
    async fn ensure_artifact<F, Fut>(&self, key: &CacheKey, ext: &str, produce: F) -> WorkerResult<PathBuf>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = MediaResult<()>>,
    {
        if let Some(path) = self.cache().artifact(key, ext).await {
            return Ok(path);
        }
        let staged = self.cache().stage_artifact(key, ext)?;
        produce(staged.path().to_path_buf()).await?;
        Ok(self.cache().commit_artifact(staged, key, ext)?)
    }
}

/// Lookup that also finds entries stored under the media's file stem.
fn by_name<'a>(key: &'a CacheKey, path: &'a Path) -> LookupRequest<'a> {
    let request = LookupRequest::new(key);
    match path.file_stem().and_then(|s| s.to_str()) {
        Some(stem) => request.with_legacy_name(stem),
        None => request,
    }
}

fn short(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}
