//! Pipeline controller: runs one synthesis session stage by stage.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Instant;

use metrics::histogram;
use tokio::sync::watch;
use tracing::Instrument;

use cutmirror_editor::{EditRequest, Editor, EditorConfig, EditorError};
use cutmirror_gateway::AnalysisError;
use cutmirror_models::{Edl, JobResult, SessionId};

use crate::analysis::{AnalyzedReference, Analyzer, Collaborators};
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::names;
use crate::planner::StrategicPlanner;
use crate::progress::ProgressReporter;
use crate::provenance::merge_cut_provenance;
use crate::reflector::Reflector;

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    PreAnalysis,
    ReferenceAnalysis,
    ClipAnalysis,
    StrategicPlanning,
    SemanticEditing,
    AestheticStyling,
    Render,
    Reflection,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::PreAnalysis,
        Stage::ReferenceAnalysis,
        Stage::ClipAnalysis,
        Stage::StrategicPlanning,
        Stage::SemanticEditing,
        Stage::AestheticStyling,
        Stage::Render,
        Stage::Reflection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::PreAnalysis => "pre_analysis",
            Stage::ReferenceAnalysis => "reference_analysis",
            Stage::ClipAnalysis => "clip_analysis",
            Stage::StrategicPlanning => "strategic_planning",
            Stage::SemanticEditing => "semantic_editing",
            Stage::AestheticStyling => "aesthetic_styling",
            Stage::Render => "render",
            Stage::Reflection => "reflection",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Stage::PreAnalysis => "Detecting scene cuts and beats",
            Stage::ReferenceAnalysis => "Analyzing reference structure",
            Stage::ClipAnalysis => "Analyzing clip library",
            Stage::StrategicPlanning => "Planning clip strategy",
            Stage::SemanticEditing => "Assembling edit",
            Stage::AestheticStyling => "Styling",
            Stage::Render => "Rendering",
            Stage::Reflection => "Reviewing result",
        }
    }

    /// Share of total progress attributed to this stage.
    fn weight(&self) -> f64 {
        match self {
            Stage::PreAnalysis => 0.10,
            Stage::ReferenceAnalysis => 0.20,
            Stage::ClipAnalysis => 0.30,
            Stage::StrategicPlanning => 0.08,
            Stage::SemanticEditing => 0.10,
            Stage::AestheticStyling => 0.02,
            Stage::Render => 0.15,
            Stage::Reflection => 0.05,
        }
    }

    pub fn started_progress(&self) -> f64 {
        Self::ALL.iter().take_while(|s| *s != self).map(|s| s.weight()).sum()
    }

    pub fn completed_progress(&self) -> f64 {
        (self.started_progress() + self.weight()).min(1.0)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Media submitted for one session.
#[derive(Debug, Clone)]
pub struct PipelineInput {
    pub session_id: SessionId,
    pub reference: PathBuf,
    pub clips: Vec<PathBuf>,
}

/// Sequences the analysis, planning, editing and reflection stages.
pub struct PipelineController {
    config: WorkerConfig,
    editor_config: EditorConfig,
    analyzer: Analyzer,
    planner: StrategicPlanner,
    reflector: Reflector,
}

struct StageRunner<'a> {
    logger: &'a JobLogger,
    progress: &'a ProgressReporter,
    cancel: &'a watch::Receiver<bool>,
    timeout: std::time::Duration,
}

impl StageRunner<'_> {
    fn check_cancelled(&self) -> WorkerResult<()> {
        if *self.cancel.borrow() {
            self.logger.log_warning("Cancelled at stage boundary");
            return Err(WorkerError::Cancelled);
        }
        Ok(())
    }

    /// Run one stage under the stage timeout.
    async fn run<T, Fut>(&self, stage: Stage, work: Fut) -> WorkerResult<T>
    where
        Fut: Future<Output = WorkerResult<T>>,
    {
        self.check_cancelled()?;
        let logger = self.logger.for_operation(stage.as_str());
        self.progress.update(stage.started_progress(), stage.label());
        logger.log_start(stage.label());

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, work.instrument(logger.create_span())).await;
        histogram!(names::STAGE_DURATION, "stage" => stage.as_str()).record(started.elapsed().as_secs_f64());

        let value = match outcome {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                logger.log_error(&e.to_string());
                return Err(e);
            }
            Err(_) => {
                let message = format!("stage {} timed out after {:?}", stage, self.timeout);
                logger.log_error(&message);
                return Err(AnalysisError::unavailable(message).into());
            }
        };

        logger.log_completion(&format!("{:.2}s", started.elapsed().as_secs_f64()));
        self.progress.update(stage.completed_progress(), stage.label());
        Ok(value)
    }
}

impl PipelineController {
    pub fn new(config: WorkerConfig, editor_config: EditorConfig, collaborators: Collaborators) -> Self {
        let planner = StrategicPlanner::new(collaborators.gateway.clone(), collaborators.cache.clone());
        let reflector = Reflector::new(collaborators.gateway.clone(), editor_config.beat_tolerance);
        Self {
            config,
            editor_config,
            analyzer: Analyzer::new(collaborators),
            planner,
            reflector,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run every stage for one session.
    ///
    /// Cancellation is honoured between stages only. Recoverable failures
    /// inside a stage degrade the result; an empty clip pool, a broken
    /// timeline, a stage timeout or unreadable reference media end the run.
    pub async fn run(
        &self,
        input: &PipelineInput,
        progress: &ProgressReporter,
        cancel: watch::Receiver<bool>,
    ) -> WorkerResult<JobResult> {
        let logger = JobLogger::new(&input.session_id, "pipeline");
        logger.log_start(&format!("reference and {} clips", input.clips.len()));
        let stages = StageRunner {
            logger: &logger,
            progress,
            cancel: &cancel,
            timeout: self.config.stage_timeout,
        };

        let (content_hash, signals) = stages
            .run(Stage::PreAnalysis, async {
                ensure_readable(&input.reference).await?;
                self.analyzer.reference_signals(&input.reference).await
            })
            .await?;
        if signals.scene_cuts.is_none() {
            progress.log("Scene detection unavailable; keeping blueprint cut origins");
        }

        let reference = stages
            .run(Stage::ReferenceAnalysis, async {
                let analysis = self
                    .analyzer
                    .reference_blueprint(&input.reference, &content_hash, &signals)
                    .await?;
                Ok(AnalyzedReference {
                    content_hash: content_hash.clone(),
                    path: input.reference.clone(),
                    signals: signals.clone(),
                    analysis,
                })
            })
            .await?;

        let mut blueprint = reference.analysis.blueprint.clone();
        let report = merge_cut_provenance(
            &mut blueprint,
            reference.signals.scene_cuts.as_deref(),
            reference.signals.beat_grid.as_ref(),
            self.config.scene_cut_tolerance,
        );
        let audio_confidence = reference.audio_confidence();
        logger.log_progress(&format!("{}; audio {:?}", report.summary(), audio_confidence));
        progress.log(report.summary());

        let clips = stages
            .run(Stage::ClipAnalysis, async {
                let clips = self
                    .analyzer
                    .analyze_clips(&input.clips, self.config.clip_concurrency)
                    .await;
                if clips.is_empty() {
                    return Err(EditorError::EmptyClipPool.into());
                }
                Ok(clips)
            })
            .await?;
        let fallbacks = clips.iter().filter(|c| c.energy_only).count();
        if fallbacks > 0 {
            progress.log(format!("{} of {} clips classified by energy only", fallbacks, clips.len()));
        }

        let hints = stages
            .run(Stage::StrategicPlanning, async {
                Ok(self.planner.plan(&blueprint, &clips).await)
            })
            .await?;

        let edl = stages
            .run(Stage::SemanticEditing, async {
                let mut editor = Editor::new(self.editor_config.clone());
                let edl = editor.assemble(EditRequest {
                    blueprint: &blueprint,
                    clips: &clips,
                    hints: &hints,
                    beats: reference.signals.beats(),
                    audio_confidence,
                })?;
                Ok(edl)
            })
            .await?;

        stages
            .run(Stage::AestheticStyling, async {
                logger.log_progress("No styling pass configured, keeping hard cuts");
                Ok(())
            })
            .await?;

        let render_path = if self.config.render_enabled {
            stages
                .run(Stage::Render, async {
                    let output = self.config.work_dir.join(input.session_id.as_str()).join("render.mp4");
                    let soundtrack = reference.signals.has_audio.then_some(input.reference.as_path());
                    Ok(self.render(&edl, soundtrack, &output, &logger).await)
                })
                .await?
        } else {
            None
        };

        let critique = if self.config.reflection_enabled {
            Some(
                stages
                    .run(Stage::Reflection, async {
                        Ok(self
                            .reflector
                            .reflect(
                                render_path.as_deref(),
                                &blueprint,
                                &edl,
                                reference.signals.beat_grid.as_ref(),
                                audio_confidence,
                            )
                            .await)
                    })
                    .await?,
            )
        } else {
            None
        };

        stages.check_cancelled()?;
        logger.log_completion(&format!(
            "{} decisions over {:.2}s",
            edl.len(),
            edl.total_duration
        ));

        Ok(JobResult {
            session_id: input.session_id.clone(),
            edl,
            blueprint,
            critique,
            render_path,
            hints,
            audio_confidence,
        })
    }

    /// Rendered file, or `None` when rendering failed.
    async fn render(
        &self,
        edl: &Edl,
        soundtrack: Option<&Path>,
        output: &Path,
        logger: &JobLogger,
    ) -> Option<PathBuf> {
        if let Some(dir) = output.parent() {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                logger.log_warning(&format!("Cannot create output directory: {}", e));
                return None;
            }
        }
        match self
            .analyzer
            .collaborators()
            .renderer
            .render(edl, soundtrack, output)
            .await
        {
            Ok(()) => Some(output.to_path_buf()),
            Err(e) => {
                logger.log_warning(&format!("Render failed, returning EDL only: {}", e));
                None
            }
        }
    }
}

async fn ensure_readable(path: &Path) -> WorkerResult<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(WorkerError::invalid_input(format!("{} is not a file", path.display()))),
        Err(e) => Err(WorkerError::invalid_input(format!("cannot read {}: {}", path.display(), e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_progress_is_increasing_and_ends_at_one() {
        let mut previous = 0.0;
        for stage in Stage::ALL {
            assert!(stage.started_progress() >= previous);
            assert!(stage.completed_progress() > stage.started_progress());
            previous = stage.completed_progress();
        }
        assert!((previous - 1.0).abs() < 1e-9);
    }
}
