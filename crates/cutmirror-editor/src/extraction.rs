//! Extraction windows inside the winning clip.

use cutmirror_models::{ClipRecord, EnergyLevel, MomentSource};

use crate::state::ClipUsage;

const EPSILON: f64 = 1e-9;

/// Source range to cut from a clip for one slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub start: f64,
    pub end: f64,
    /// Below 1.0 when the source is stretched to fill a longer slot
    pub playback_rate: f64,
    pub source: MomentSource,
    /// Tier of the extracted material
    pub energy: EnergyLevel,
}

/// Next unused stretch of the clip's best moment for `tier`.
///
/// A clip whose overall energy is `tier` and has no explicit moment for it
/// offers its whole length. Advances the clip's cursor for that tier.
pub fn from_best_moment(clip: &ClipRecord, usage: &mut ClipUsage, tier: EnergyLevel, needed: f64) -> Option<Window> {
    let (moment_start, moment_end) = match clip.moment_for(tier) {
        Some(moment) => (moment.start, moment.end.min(clip.duration)),
        None if clip.energy == tier => (0.0, clip.duration),
        None => return None,
    };

    let cursor = usage
        .moment_cursor
        .get(&tier)
        .copied()
        .unwrap_or(moment_start)
        .max(moment_start);
    if moment_end - cursor + EPSILON < needed {
        return None;
    }
    let end = (cursor + needed).min(moment_end);
    usage.moment_cursor.insert(tier, end);
    Some(Window {
        start: cursor,
        end,
        playback_rate: 1.0,
        source: MomentSource::BestMoment,
        energy: tier,
    })
}

/// Next unused stretch of the whole clip, wrapping to the start when the
/// remainder is too short. `None` when the clip is shorter than `needed`.
pub fn sequential(clip: &ClipRecord, usage: &mut ClipUsage, needed: f64) -> Option<Window> {
    if clip.duration + EPSILON < needed {
        return None;
    }
    let mut cursor = usage.sequential_cursor;
    if clip.duration - cursor + EPSILON < needed {
        cursor = 0.0;
    }
    let end = (cursor + needed).min(clip.duration);
    usage.sequential_cursor = end;
    Some(Window {
        start: cursor,
        end,
        playback_rate: 1.0,
        source: MomentSource::Sequential,
        energy: clip.energy,
    })
}

/// The whole clip slowed down to fill `needed` seconds.
pub fn stretched(clip: &ClipRecord, needed: f64) -> Window {
    let rate = if needed > 0.0 {
        (clip.duration / needed).min(1.0)
    } else {
        1.0
    };
    Window {
        start: 0.0,
        end: clip.duration,
        playback_rate: rate,
        source: MomentSource::RoundRobin,
        energy: clip.energy,
    }
}
