//! Strategic planner: per-arc-stage clip suggestions for the editor.
//!
//! Purely an enrichment layer. Every failure degrades to
//! [`AdvisorHints::none`] and the editor runs on base signals.

use std::sync::Arc;

use tracing::{info, warn};

use cutmirror_cache::{combine_hashes, hash_json, CacheKey, ContentCache};
use cutmirror_gateway::{AnalysisGateway, AnalysisRequest, TaskKind};
use cutmirror_models::{AdvisorHints, Blueprint, ClipRecord, LibrarySummary};

use crate::prompts;

pub struct StrategicPlanner {
    gateway: Arc<AnalysisGateway>,
    cache: ContentCache,
}

impl StrategicPlanner {
    pub fn new(gateway: Arc<AnalysisGateway>, cache: ContentCache) -> Self {
        Self { gateway, cache }
    }

    /// Cache key of the (blueprint, library) pair.
    pub fn plan_key(blueprint: &Blueprint, library: &LibrarySummary) -> Option<CacheKey> {
        let blueprint_hash = hash_json(blueprint).ok()?;
        let library_hash = hash_json(library).ok()?;
        Some(CacheKey::plan(
            combine_hashes([blueprint_hash, library_hash]),
            prompts::PLAN_PROMPT_VERSION,
        ))
    }

    /// Hints for assembling `clips` against `blueprint`. Never fails.
    pub async fn plan(&self, blueprint: &Blueprint, clips: &[ClipRecord]) -> AdvisorHints {
        let library = LibrarySummary::from_records(clips);
        let request = AnalysisRequest::new(TaskKind::StrategicPlan, prompts::plan_prompt(blueprint, &library))
            .with_prompt_version(prompts::PLAN_PROMPT_VERSION);

        let mut hints = match Self::plan_key(blueprint, &library) {
            Some(key) => {
                let computed = self
                    .cache
                    .get_or_compute::<AdvisorHints, std::convert::Infallible, _, _>(&key, || async {
                        Ok(self.gateway.analyze_or(&request, AdvisorHints::none).await.into_computed())
                    })
                    .await;
                match computed {
                    Ok(hints) => hints,
                    Err(never) => match never {},
                }
            }
            None => {
                warn!("Could not hash planning inputs, planning without cache");
                self.gateway.analyze_or(&request, AdvisorHints::none).await.value
            }
        };

        hints.retain_known(library.clip_ids());
        info!(
            stages = hints.arc_stage_clips.len(),
            gaps = hints.assessment.gaps.len(),
            confidence = ?hints.assessment.confidence,
            has_overrides = !hints.overrides.is_empty(),
            "Strategic plan ready"
        );
        hints
    }
}
