//! End-to-end sessions through the job service with faked collaborators.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Notify;
use tokio_test::{assert_err, assert_ok};

use cutmirror_cache::{hash_file, CacheConfig, CacheKey, ContentCache, LegacyFilenameLookup, LookupRequest, LookupStrategy};
use cutmirror_editor::EditorConfig;
use cutmirror_gateway::{
    AnalysisError, AnalysisGateway, AnalysisRequest, AnalysisResult, Credential, GatewayConfig, ReasoningBackend,
    RetryConfig, TaskKind,
};
use cutmirror_media::{
    BeatDetector, BeatGrid, MediaError, MediaInfo, MediaNormalizer, MediaProber, MediaResult, Renderer,
    SceneCutDetector,
};
use cutmirror_models::{
    AudioConfidence, CritiqueSource, CutOrigin, Edl, EnergyLevel, JobStatus, ProgressEvent, SessionId,
};
use cutmirror_worker::{prompts, Collaborators, JobService, PipelineController, WorkerConfig, WorkerError};

const BLUEPRINT: &str = r#"{
    "segments": [
        {"start": 0.0, "end": 2.0, "energy": "high", "arc_stage": "intro"},
        {"start": 2.0, "end": 5.0, "energy": "medium", "arc_stage": "build_up"},
        {"start": 5.0, "end": 6.5, "energy": "low", "arc_stage": "outro"}
    ],
    "editing_style": "punchy"
}"#;

const CLIP_A: &str = r#"{
    "energy": "high",
    "motion": "fast",
    "best_moments": [
        {"energy": "high", "start": 0.0, "end": 4.0, "reason": "jump"},
        {"energy": "medium", "start": 4.0, "end": 9.0, "reason": "run-up"}
    ]
}"#;

const CLIP_B: &str = r#"{
    "energy": "low",
    "best_moments": [{"energy": "low", "start": 0.0, "end": 6.0}]
}"#;

const CRITIQUE: &str = r#"{"fidelity_score": 0.8, "summary": "close"}"#;

/// Reasoning service answering by task and by the bytes of the attached media.
#[derive(Default)]
struct FakeBackend {
    calls: Mutex<HashMap<TaskKind, usize>>,
    block_audio: bool,
    fail_planning: bool,
    reference_gate: Option<Arc<Notify>>,
    reference_delay: Option<Duration>,
}

impl FakeBackend {
    fn calls(&self, task: TaskKind) -> usize {
        self.calls.lock().unwrap().get(&task).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ReasoningBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    async fn generate(&self, _credential: &Credential, request: &AnalysisRequest) -> AnalysisResult<String> {
        *self.calls.lock().unwrap().entry(request.task).or_default() += 1;
        let media = match request.media.first() {
            Some(m) => tokio::fs::read_to_string(&m.path).await.unwrap_or_default(),
            None => String::new(),
        };

        match request.task {
            TaskKind::ReferenceBlueprint => {
                if let Some(gate) = &self.reference_gate {
                    gate.notified().await;
                }
                if let Some(delay) = self.reference_delay {
                    tokio::time::sleep(delay).await;
                }
                if self.block_audio && !media.starts_with("muted:") {
                    return Err(AnalysisError::blocked("audio flagged"));
                }
                Ok(BLUEPRINT.to_string())
            }
            TaskKind::ClipAssessment if media.contains("clip-a") => Ok(CLIP_A.to_string()),
            TaskKind::ClipAssessment => Ok(CLIP_B.to_string()),
            TaskKind::StrategicPlan if self.fail_planning => Err(AnalysisError::unavailable("planner down")),
            TaskKind::StrategicPlan => Ok(r#"{"arc_stage_clips": {}}"#.to_string()),
            TaskKind::Reflection => Ok(CRITIQUE.to_string()),
        }
    }
}

struct FakeProber {
    durations: HashMap<String, f64>,
}

#[async_trait]
impl MediaProber for FakeProber {
    async fn probe(&self, path: &Path) -> MediaResult<MediaInfo> {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let duration = self
            .durations
            .get(name)
            .copied()
            .ok_or_else(|| MediaError::FileNotFound(path.to_path_buf()))?;
        Ok(MediaInfo {
            duration,
            width: 1280,
            height: 720,
            fps: 30.0,
            has_audio: name.starts_with("reference"),
        })
    }
}

struct CopyNormalizer;

#[async_trait]
impl MediaNormalizer for CopyNormalizer {
    async fn proxy(&self, input: &Path, output: &Path) -> MediaResult<()> {
        tokio::fs::copy(input, output).await?;
        Ok(())
    }

    async fn mute(&self, input: &Path, output: &Path) -> MediaResult<()> {
        let bytes = tokio::fs::read_to_string(input).await?;
        tokio::fs::write(output, format!("muted:{}", bytes)).await?;
        Ok(())
    }
}

struct FixedScenes(Option<Vec<f64>>);

#[async_trait]
impl SceneCutDetector for FixedScenes {
    async fn detect(&self, _media: &Path) -> MediaResult<Vec<f64>> {
        self.0
            .clone()
            .ok_or_else(|| MediaError::invalid_media("scene detector crashed"))
    }
}

struct FixedBeats;

#[async_trait]
impl BeatDetector for FixedBeats {
    async fn detect(&self, _media: &Path) -> MediaResult<Option<BeatGrid>> {
        Ok(Some(BeatGrid {
            tempo_bpm: 120.0,
            beats: (0..14).map(|i| i as f64 * 0.5 + 0.05).collect(),
            confidence: 0.9,
        }))
    }
}

#[derive(Default)]
struct RecordingRenderer {
    renders: Mutex<Vec<(usize, Option<PathBuf>)>>,
}

#[async_trait]
impl Renderer for RecordingRenderer {
    async fn render(&self, edl: &Edl, soundtrack: Option<&Path>, output: &Path) -> MediaResult<()> {
        self.renders
            .lock()
            .unwrap()
            .push((edl.len(), soundtrack.map(Path::to_path_buf)));
        tokio::fs::write(output, b"rendered").await?;
        Ok(())
    }
}

struct Harness {
    dir: TempDir,
    backend: Arc<FakeBackend>,
    renderer: Arc<RecordingRenderer>,
    service: JobService,
}

struct Options {
    backend: FakeBackend,
    scenes: Option<Vec<f64>>,
    stage_timeout: Duration,
    session_ttl: Duration,
    max_finished_sessions: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            backend: FakeBackend::default(),
            scenes: Some(vec![2.0, 5.0]),
            stage_timeout: Duration::from_secs(30),
            session_ttl: Duration::from_secs(3600),
            max_finished_sessions: 100,
        }
    }
}

fn harness(options: Options) -> Harness {
    let dir = TempDir::new().unwrap();
    for (name, contents) in [
        ("reference.mp4", "reference-bytes"),
        ("clip-a.mp4", "clip-a-bytes"),
        ("clip-b.mp4", "clip-b-bytes"),
        ("broken.mp4", "not a video"),
    ] {
        std::fs::write(dir.path().join(name), contents).unwrap();
    }

    let backend = Arc::new(options.backend);
    let gateway = AnalysisGateway::new(
        backend.clone(),
        GatewayConfig {
            api_keys: vec!["test-key".to_string()],
            retry: RetryConfig::default().with_base_delay(Duration::from_millis(1)),
            requests_per_minute: 6000,
            ..GatewayConfig::default()
        },
    );
    let renderer = Arc::new(RecordingRenderer::default());
    let collaborators = Collaborators {
        prober: Arc::new(FakeProber {
            durations: HashMap::from([
                ("reference.mp4".to_string(), 6.5),
                ("clip-a.mp4".to_string(), 10.0),
                ("clip-b.mp4".to_string(), 8.0),
            ]),
        }),
        normalizer: Arc::new(CopyNormalizer),
        scenes: Arc::new(FixedScenes(options.scenes)),
        beats: Arc::new(FixedBeats),
        renderer: renderer.clone(),
        gateway: Arc::new(gateway),
        cache: ContentCache::new(CacheConfig {
            root: dir.path().join("cache"),
        }),
    };

    let config = WorkerConfig {
        work_dir: dir.path().join("work"),
        stage_timeout: options.stage_timeout,
        session_ttl: options.session_ttl,
        max_finished_sessions: options.max_finished_sessions,
        ..WorkerConfig::default()
    };
    let editor = EditorConfig {
        seed: Some(7),
        ..EditorConfig::default()
    };
    let service = JobService::new(PipelineController::new(config, editor, collaborators));

    Harness {
        dir,
        backend,
        renderer,
        service,
    }
}

impl Harness {
    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    async fn submit(&self, clips: &[&str]) -> SessionId {
        let clips = clips.iter().map(|c| self.path(c)).collect();
        self.service.submit(self.path("reference.mp4"), clips).await.unwrap()
    }

    /// Every event from subscription until the terminal one.
    async fn events(&self, id: &SessionId) -> Vec<ProgressEvent> {
        let (latest, mut rx) = self.service.subscribe(id).await.unwrap();
        let mut events = vec![latest];
        tokio::time::timeout(Duration::from_secs(10), async {
            while !events.last().is_some_and(|e| e.status.is_terminal()) {
                match rx.recv().await {
                    Ok(event) => events.push(event),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(e) => panic!("progress stream closed early: {}", e),
                }
            }
        })
        .await
        .expect("session did not finish");
        events
    }
}

fn assert_well_formed(events: &[ProgressEvent]) {
    for pair in events.windows(2) {
        assert!(pair[1].progress >= pair[0].progress, "progress went backwards");
    }
    let terminal = events.iter().filter(|e| e.status.is_terminal()).count();
    assert_eq!(terminal, 1);
    assert!(events.last().unwrap().status.is_terminal());
}

fn assert_tiles(edl: &Edl, total: f64) {
    assert_ok!(edl.verify_continuity());
    assert_eq!(edl.decisions[0].timeline_start, 0.0);
    assert!((edl.total_duration - total).abs() < 1e-9);
}

#[tokio::test]
async fn test_full_session_produces_result_and_single_terminal_event() {
    let h = harness(Options::default());
    let id = h.submit(&["clip-a.mp4", "clip-b.mp4"]).await;

    let events = h.events(&id).await;
    assert_well_formed(&events);
    assert_eq!(events.last().unwrap().status, JobStatus::Complete);
    assert_eq!(events.last().unwrap().progress, 1.0);

    let result = h.service.get_result(&id).await.unwrap();
    assert_eq!(result.edl.len(), 3);
    assert_tiles(&result.edl, 6.5);
    assert!(result.blueprint.segments.iter().all(|s| s.cut_origin == Some(CutOrigin::Visual)));
    assert_eq!(result.audio_confidence, AudioConfidence::Observed);
    assert_eq!(result.critique.as_ref().unwrap().source, CritiqueSource::External);
    assert!(result.render_path.as_ref().unwrap().exists());

    let renders = h.renderer.renders.lock().unwrap().clone();
    assert_eq!(renders, vec![(3, Some(h.path("reference.mp4")))]);
}

#[tokio::test]
async fn test_low_segment_gets_low_clip_and_high_segments_never_do() {
    let h = harness(Options::default());
    let id = h.submit(&["clip-a.mp4", "clip-b.mp4"]).await;
    h.events(&id).await;

    let result = h.service.get_result(&id).await.unwrap();
    let a = &result.edl.decisions[0].clip_id;
    assert_eq!(&result.edl.decisions[1].clip_id, a);
    assert_ne!(&result.edl.decisions[2].clip_id, a);
    assert_eq!(result.edl.decisions[2].source_energy, EnergyLevel::Low);
}

#[tokio::test]
async fn test_second_run_on_identical_media_uses_cache() {
    let h = harness(Options::default());
    let first = h.submit(&["clip-a.mp4", "clip-b.mp4"]).await;
    h.events(&first).await;

    let reference_calls = h.backend.calls(TaskKind::ReferenceBlueprint);
    let clip_calls = h.backend.calls(TaskKind::ClipAssessment);
    let plan_calls = h.backend.calls(TaskKind::StrategicPlan);
    assert_eq!((reference_calls, clip_calls, plan_calls), (1, 2, 1));

    // Renamed copies resolve to the same content hashes.
    std::fs::rename(h.path("clip-a.mp4"), h.path("clip-a-renamed.mp4")).unwrap();
    std::fs::copy(h.path("clip-a-renamed.mp4"), h.path("clip-a.mp4")).unwrap();
    let second = h.submit(&["clip-a.mp4", "clip-b.mp4"]).await;
    h.events(&second).await;

    assert_eq!(h.backend.calls(TaskKind::ReferenceBlueprint), reference_calls);
    assert_eq!(h.backend.calls(TaskKind::ClipAssessment), clip_calls);
    assert_eq!(h.backend.calls(TaskKind::StrategicPlan), plan_calls);

    let one = h.service.get_result(&first).await.unwrap();
    let two = h.service.get_result(&second).await.unwrap();
    assert_eq!(one.blueprint, two.blueprint);
    assert_eq!(one.edl, two.edl);
}

#[tokio::test]
async fn test_entries_stored_under_file_name_are_reused_and_migrated() {
    let h = harness(Options::default());
    let first = h.submit(&["clip-a.mp4", "clip-b.mp4"]).await;
    h.events(&first).await;
    let clip_calls = h.backend.calls(TaskKind::ClipAssessment);

    // Move the clip records to where older releases kept them.
    let cache = ContentCache::new(CacheConfig {
        root: h.path("cache"),
    });
    let mut moved = Vec::new();
    for stem in ["clip-a", "clip-b"] {
        let hash = hash_file(h.path(&format!("{}.mp4", stem))).await.unwrap();
        let key = CacheKey::analysis(hash, TaskKind::ClipAssessment.as_str(), prompts::CLIP_PROMPT_VERSION);
        let canonical = cache.entry_path(&key);
        let legacy = LegacyFilenameLookup
            .locate(cache.root(), &LookupRequest::new(&key).with_legacy_name(stem))
            .unwrap();
        std::fs::create_dir_all(legacy.parent().unwrap()).unwrap();
        std::fs::rename(&canonical, &legacy).unwrap();
        moved.push((canonical, legacy));
    }

    let second = h.submit(&["clip-a.mp4", "clip-b.mp4"]).await;
    let events = h.events(&second).await;
    assert_eq!(events.last().unwrap().status, JobStatus::Complete);

    assert_eq!(h.backend.calls(TaskKind::ClipAssessment), clip_calls);
    for (canonical, legacy) in moved {
        assert!(canonical.exists());
        assert!(!legacy.exists());
    }
    let one = h.service.get_result(&first).await.unwrap();
    let two = h.service.get_result(&second).await.unwrap();
    assert_eq!(one.edl, two.edl);
}

#[tokio::test]
async fn test_duplicate_uploads_collapse_to_one_record() {
    let h = harness(Options::default());
    std::fs::copy(h.path("clip-a.mp4"), h.path("copy-of-a.mp4")).unwrap();
    let id = h.submit(&["clip-a.mp4", "copy-of-a.mp4", "clip-a.mp4", "clip-b.mp4"]).await;
    h.events(&id).await;

    assert_eq!(h.backend.calls(TaskKind::ClipAssessment), 2);
    let result = h.service.get_result(&id).await.unwrap();
    assert_tiles(&result.edl, 6.5);
}

#[tokio::test]
async fn test_failing_planner_still_completes() {
    let h = harness(Options {
        backend: FakeBackend {
            fail_planning: true,
            ..FakeBackend::default()
        },
        ..Options::default()
    });
    let id = h.submit(&["clip-a.mp4", "clip-b.mp4"]).await;

    let events = h.events(&id).await;
    assert_eq!(events.last().unwrap().status, JobStatus::Complete);
    let result = h.service.get_result(&id).await.unwrap();
    assert!(result.hints.is_empty());
    assert_tiles(&result.edl, 6.5);
}

#[tokio::test]
async fn test_blocked_audio_is_retried_muted_and_disables_beat_snapping() {
    let h = harness(Options {
        backend: FakeBackend {
            block_audio: true,
            ..FakeBackend::default()
        },
        scenes: Some(Vec::new()),
        ..Options::default()
    });
    let id = h.submit(&["clip-a.mp4", "clip-b.mp4"]).await;
    h.events(&id).await;

    assert_eq!(h.backend.calls(TaskKind::ReferenceBlueprint), 2);
    let result = h.service.get_result(&id).await.unwrap();
    assert_eq!(result.audio_confidence, AudioConfidence::Inferred);
    assert!(result.edl.decisions.iter().all(|d| !d.beat_snapped));
    assert!(result.critique.as_ref().unwrap().rhythm_alignment.is_none());
    assert!(h.path("cache/normalized-media").read_dir().unwrap().any(|e| {
        e.unwrap().file_name().to_string_lossy().contains(".muted.")
    }));
}

#[tokio::test]
async fn test_scene_detection_failure_defaults_segments_to_visual() {
    let h = harness(Options {
        scenes: None,
        ..Options::default()
    });
    let id = h.submit(&["clip-a.mp4", "clip-b.mp4"]).await;

    let events = h.events(&id).await;
    assert_eq!(events.last().unwrap().status, JobStatus::Complete);

    let result = h.service.get_result(&id).await.unwrap();
    assert!(result.blueprint.segments.iter().all(|s| s.cut_origin == Some(CutOrigin::Visual)));
    // Visual segments are never split.
    assert_eq!(result.edl.len(), result.blueprint.segments.len());
    for (decision, segment) in result.edl.decisions.iter().zip(&result.blueprint.segments) {
        assert_eq!(decision.timeline_start, segment.start);
        assert_eq!(decision.timeline_end, segment.end);
    }
}

#[tokio::test]
async fn test_no_usable_clips_ends_in_error_event() {
    let h = harness(Options::default());
    let id = h.submit(&["broken.mp4", "missing.mp4"]).await;

    let events = h.events(&id).await;
    assert_well_formed(&events);
    let last = events.last().unwrap();
    assert_eq!(last.status, JobStatus::Error);
    assert_eq!(last.message, "no usable clips provided");

    assert!(matches!(
        h.service.get_result(&id).await,
        Err(WorkerError::NotReady(_))
    ));
    assert_eq!(h.backend.calls(TaskKind::StrategicPlan), 0);
}

#[tokio::test]
async fn test_cancel_stops_at_next_stage_boundary() {
    let gate = Arc::new(Notify::new());
    let h = harness(Options {
        backend: FakeBackend {
            reference_gate: Some(gate.clone()),
            ..FakeBackend::default()
        },
        ..Options::default()
    });
    let id = h.submit(&["clip-a.mp4", "clip-b.mp4"]).await;

    // Wait until the reference stage is in flight.
    tokio::time::timeout(Duration::from_secs(5), async {
        while h.backend.calls(TaskKind::ReferenceBlueprint) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert!(h.service.cancel(&id).await.unwrap());
    gate.notify_one();

    let events = h.events(&id).await;
    let last = events.last().unwrap();
    assert_eq!(last.status, JobStatus::Error);
    assert_eq!(last.message, "Run cancelled");
    assert_eq!(h.backend.calls(TaskKind::ClipAssessment), 0);
    assert!(!h.service.cancel(&id).await.unwrap());
}

#[tokio::test]
async fn test_stage_timeout_reports_unavailable() {
    let h = harness(Options {
        backend: FakeBackend {
            reference_delay: Some(Duration::from_secs(30)),
            ..FakeBackend::default()
        },
        stage_timeout: Duration::from_millis(300),
        ..Options::default()
    });
    let id = h.submit(&["clip-a.mp4"]).await;

    let events = h.events(&id).await;
    let last = events.last().unwrap();
    assert_eq!(last.status, JobStatus::Error);
    assert!(last.message.contains("unavailable"), "{}", last.message);
    assert!(last.message.contains("timed out"));
}

#[tokio::test]
async fn test_oldest_finished_sessions_are_dropped_over_cap() {
    let h = harness(Options {
        max_finished_sessions: 1,
        ..Options::default()
    });
    let first = h.submit(&["clip-a.mp4", "clip-b.mp4"]).await;
    h.events(&first).await;
    let second = h.submit(&["clip-a.mp4", "clip-b.mp4"]).await;
    h.events(&second).await;

    // Retention is enforced when the next session arrives.
    let third = h.submit(&["clip-a.mp4", "clip-b.mp4"]).await;
    assert!(matches!(
        h.service.status(&first).await,
        Err(WorkerError::SessionNotFound(_))
    ));
    assert_ok!(h.service.get_result(&second).await);
    assert_ok!(h.service.status(&third).await);
    h.events(&third).await;
    assert_eq!(h.service.list().await.len(), 2);
}

#[tokio::test]
async fn test_finished_sessions_expire_after_ttl() {
    let h = harness(Options {
        session_ttl: Duration::from_millis(50),
        ..Options::default()
    });
    let first = h.submit(&["clip-a.mp4", "clip-b.mp4"]).await;
    h.events(&first).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let second = h.submit(&["clip-a.mp4", "clip-b.mp4"]).await;
    assert!(matches!(
        h.service.get_result(&first).await,
        Err(WorkerError::SessionNotFound(_))
    ));
    // Running sessions are never dropped, whatever their age.
    assert_ok!(h.service.status(&second).await);
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let h = harness(Options::default());
    let missing = SessionId::from_string("nope");
    assert_err!(h.service.status(&missing).await);
    assert!(matches!(
        h.service.cancel(&missing).await,
        Err(WorkerError::SessionNotFound(_))
    ));
}
