//! Single-pass greedy assembly of an EDL.

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use cutmirror_models::{
    AdvisorHints, AudioConfidence, Blueprint, ClipRecord, EditDecision, EligibilityTier, EnergyLevel, Edl,
    MomentSource, ScoreBreakdown,
};

use crate::config::EditorConfig;
use crate::error::{EditorError, EditorResult};
use crate::extraction::{self, Window};
use crate::pacing::{self, Cut};
use crate::scoring::{eligibility, ScoringContext};
use crate::state::MatchState;

/// Inputs of one assembly run.
#[derive(Debug, Clone, Copy)]
pub struct EditRequest<'a> {
    pub blueprint: &'a Blueprint,
    pub clips: &'a [ClipRecord],
    pub hints: &'a AdvisorHints,
    /// Beat timestamps on the reference timeline
    pub beats: &'a [f64],
    pub audio_confidence: AudioConfidence,
}

/// The matching and scoring engine.
///
/// Segments are processed strictly in order; each decision reads and
/// updates the run's [`MatchState`], so there is no backtracking.
pub struct Editor {
    config: EditorConfig,
    rng: StdRng,
}

struct Candidate {
    clip: usize,
    material: EnergyLevel,
}

impl Editor {
    pub fn new(config: EditorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { config, rng }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Build the EDL for a blueprint from a clip pool.
    ///
    /// Fails only for an empty pool, an unusable blueprint, or a broken
    /// timeline, which would be a defect in this engine.
    pub fn assemble(&mut self, request: EditRequest<'_>) -> EditorResult<Edl> {
        let pool: Vec<&ClipRecord> = request
            .clips
            .iter()
            .filter(|c| c.duration.is_finite() && c.duration > 0.0)
            .collect();
        if pool.is_empty() {
            return Err(EditorError::EmptyClipPool);
        }
        let blueprint = request.blueprint;
        blueprint.validate()?;

        let config = self.config.with_overrides(&request.hints.overrides);
        let mut beats: Vec<f64> = request.beats.iter().copied().filter(|b| b.is_finite()).collect();
        beats.sort_by(f64::total_cmp);

        let cuts = pacing::plan_cuts(
            blueprint,
            &beats,
            request.audio_confidence.allows_beat_snapping(),
            &config,
            &mut self.rng,
        );

        let mut state = MatchState::new(pool.len());
        let mut decisions: Vec<EditDecision> = Vec::with_capacity(cuts.len());
        for cut in &cuts {
            let timeline_start = decisions.last().map_or(cut.start, |d| d.timeline_end);
            let decision = place(&pool, &mut state, &config, &request, cut, timeline_start, decisions.len())?;
            decisions.push(decision);
        }

        let total_duration = decisions.last().map_or(0.0, |d| d.timeline_end);
        let edl = Edl {
            decisions,
            total_duration,
        };
        edl.verify_continuity()?;

        info!(
            segments = blueprint.segments.len(),
            decisions = edl.len(),
            clips = pool.len(),
            distinct_clips = (0..pool.len()).filter(|i| state.usage(*i).count > 0).count(),
            total_duration,
            "Assembled edit decision list"
        );
        Ok(edl)
    }
}

/// Choose a clip and window for one cut and update the run state.
fn place(
    pool: &[&ClipRecord],
    state: &mut MatchState,
    config: &EditorConfig,
    request: &EditRequest<'_>,
    cut: &Cut,
    timeline_start: f64,
    index: usize,
) -> EditorResult<EditDecision> {
    let segment = &request.blueprint.segments[cut.segment_index];
    let ctx = ScoringContext {
        blueprint: request.blueprint,
        segment,
        hints: request.hints,
        config,
        previous_motion: state.previous_motion(),
        position: timeline_start,
    };
    let needed = cut.end - timeline_start;

    let (tier, candidates) = ladder(pool, segment.energy);
    if tier == EligibilityTier::Unrestricted {
        warn!(
            segment = cut.segment_index,
            energy = %segment.energy,
            "No clip offers compatible energy, widening to the whole pool"
        );
    }

    // Clips outside the cooldown window always win over clips inside it.
    let fresh: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| !ctx.in_cooldown(state.usage(c.clip)))
        .collect();
    let contenders: Vec<&Candidate> = if fresh.is_empty() {
        candidates.iter().collect()
    } else {
        fresh
    };

    // Highest score first; equal scores go to the less used clip.
    let mut ranked: Vec<(&Candidate, ScoreBreakdown)> = contenders
        .into_iter()
        .map(|c| (c, ctx.score(pool[c.clip], state.usage(c.clip))))
        .collect();
    ranked.sort_by(|(a, a_score), (b, b_score)| {
        b_score
            .total()
            .total_cmp(&a_score.total())
            .then(state.usage(a.clip).count.cmp(&state.usage(b.clip).count))
    });

    // The ladder falls back to the whole pool, so this only fails when the
    // pool itself is empty.
    let Some(top) = ranked.first().map(|(c, _)| c.clip) else {
        return Err(EditorError::EmptyClipPool);
    };

    let mut placed = None;
    for (candidate, breakdown) in &ranked {
        let clip = candidate.clip;
        let window = extraction::from_best_moment(pool[clip], state.usage_mut(clip), candidate.material, needed)
            .or_else(|| extraction::sequential(pool[clip], state.usage_mut(clip), needed));
        if let Some(window) = window {
            placed = Some((clip, window, breakdown.clone()));
            break;
        }
    }

    let (clip, window, score) = match placed {
        Some(placed) => {
            if placed.0 != top {
                debug!(
                    segment = cut.segment_index,
                    from = %pool[top].id,
                    to = %pool[placed.0].id,
                    "Winner too short for slot, using next contender"
                );
            }
            placed
        }
        None => {
            let cooling: Vec<bool> = (0..pool.len()).map(|i| ctx.in_cooldown(state.usage(i))).collect();
            let (fallback, window) = round_robin(pool, state, &candidates, &cooling, needed);
            debug!(
                segment = cut.segment_index,
                from = %pool[top].id,
                to = %pool[fallback].id,
                "No contender long enough for slot, using round-robin fallback"
            );
            (fallback, window, ctx.score(pool[fallback], state.usage(fallback)))
        }
    };

    let record = pool[clip];
    state.record_placement(clip, cut.end, record.motion);

    debug!(
        index,
        segment = cut.segment_index,
        clip = %record.id,
        start = timeline_start,
        end = cut.end,
        score = score.total(),
        source = ?window.source,
        "Placed clip"
    );

    let Window {
        start: source_start,
        end: source_end,
        playback_rate,
        source: moment_source,
        energy: source_energy,
    } = window;

    Ok(EditDecision {
        index,
        segment_index: cut.segment_index,
        timeline_start,
        timeline_end: cut.end,
        clip_id: record.id.clone(),
        source_path: record.path.clone(),
        source_start,
        source_end,
        playback_rate,
        energy: segment.energy,
        source_energy,
        arc_stage: segment.arc_stage,
        cut_origin: segment.origin(),
        moment_source,
        eligibility: tier,
        beat_snapped: cut.beat_snapped,
        score,
    })
}

/// Narrowest non-empty rung of the eligibility ladder.
fn ladder(pool: &[&ClipRecord], energy: EnergyLevel) -> (EligibilityTier, Vec<Candidate>) {
    let mut exact = Vec::new();
    let mut compatible = Vec::new();
    for (clip, record) in pool.iter().enumerate() {
        match eligibility(record, energy) {
            Some((EligibilityTier::Exact, material)) => exact.push(Candidate { clip, material }),
            Some((_, material)) => compatible.push(Candidate { clip, material }),
            None => {}
        }
    }
    if !exact.is_empty() {
        (EligibilityTier::Exact, exact)
    } else if !compatible.is_empty() {
        (EligibilityTier::Compatible, compatible)
    } else {
        let everyone = pool
            .iter()
            .enumerate()
            .map(|(clip, record)| Candidate {
                clip,
                material: record.energy,
            })
            .collect();
        (EligibilityTier::Unrestricted, everyone)
    }
}

/// Next candidate, in pool order from the round-robin cursor, long enough
/// for the slot; failing that the longest candidate, slowed down. Clips
/// outside the cooldown window are visited before clips inside it.
fn round_robin(
    pool: &[&ClipRecord],
    state: &mut MatchState,
    candidates: &[Candidate],
    cooling: &[bool],
    needed: f64,
) -> (usize, Window) {
    let n = pool.len();
    let start = state.round_robin();
    for want_cooling in [false, true] {
        for offset in 0..n {
            let clip = (start + offset) % n;
            if cooling[clip] != want_cooling || !candidates.iter().any(|c| c.clip == clip) {
                continue;
            }
            if let Some(mut window) = extraction::sequential(pool[clip], state.usage_mut(clip), needed) {
                state.advance_round_robin(clip);
                window.source = MomentSource::RoundRobin;
                return (clip, window);
            }
        }
    }

    let longest = candidates
        .iter()
        .map(|c| c.clip)
        .max_by(|a, b| {
            cooling[*b]
                .cmp(&cooling[*a])
                .then(pool[*a].duration.total_cmp(&pool[*b].duration))
                .then(b.cmp(a))
        })
        .unwrap_or(0);
    state.advance_round_robin(longest);
    (longest, extraction::stretched(pool[longest], needed))
}
