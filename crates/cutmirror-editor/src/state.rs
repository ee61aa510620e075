//! Run-scoped mutable matching state.

use std::collections::HashMap;

use cutmirror_models::{EnergyLevel, MotionClass};

/// Per-clip bookkeeping for one synthesis run.
#[derive(Debug, Clone, Default)]
pub struct ClipUsage {
    pub count: u32,
    /// Timeline end of the most recent placement
    pub last_end: Option<f64>,
    /// Next unused offset inside each tier's best moment
    pub moment_cursor: HashMap<EnergyLevel, f64>,
    /// Next unused offset for sequential coverage of the whole clip
    pub sequential_cursor: f64,
}

impl ClipUsage {
    /// Placed within `window` seconds before `position`.
    pub fn in_cooldown(&self, position: f64, window: f64) -> bool {
        self.last_end.is_some_and(|end| position - end < window)
    }
}

/// Usage counters and cursors owned by one editor run, indexed by the
/// clip's position in the pool. Nothing survives between runs.
#[derive(Debug, Clone)]
pub struct MatchState {
    usage: Vec<ClipUsage>,
    previous_motion: Option<MotionClass>,
    round_robin: usize,
}

impl MatchState {
    pub fn new(pool_size: usize) -> Self {
        Self {
            usage: vec![ClipUsage::default(); pool_size],
            previous_motion: None,
            round_robin: 0,
        }
    }

    pub fn usage(&self, clip: usize) -> &ClipUsage {
        &self.usage[clip]
    }

    pub fn usage_mut(&mut self, clip: usize) -> &mut ClipUsage {
        &mut self.usage[clip]
    }

    pub fn previous_motion(&self) -> Option<MotionClass> {
        self.previous_motion
    }

    /// Next starting point of the round-robin fallback.
    pub fn round_robin(&self) -> usize {
        self.round_robin
    }

    pub fn advance_round_robin(&mut self, past: usize) {
        self.round_robin = past + 1;
    }

    /// Record a placement ending at `timeline_end`.
    pub fn record_placement(&mut self, clip: usize, timeline_end: f64, motion: MotionClass) {
        let usage = &mut self.usage[clip];
        usage.count += 1;
        usage.last_end = Some(timeline_end);
        self.previous_motion = Some(motion);
    }

    pub fn total_placements(&self) -> u32 {
        self.usage.iter().map(|u| u.count).sum()
    }
}
