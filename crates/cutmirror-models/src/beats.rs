//! Lookups on ascending beat timestamps.

/// Closest beat to `t`. `beats` must be sorted ascending; ties go to the
/// earlier beat.
pub fn nearest_beat(beats: &[f64], t: f64) -> Option<f64> {
    let idx = beats.partition_point(|b| *b < t);
    let before = idx.checked_sub(1).map(|i| beats[i]);
    let after = beats.get(idx).copied();
    match (before, after) {
        (Some(b), Some(a)) => Some(if t - b <= a - t { b } else { a }),
        (b, a) => b.or(a),
    }
}

/// Closest beat within `tolerance` seconds of `t`.
pub fn snap_to_beat(beats: &[f64], t: f64, tolerance: f64) -> Option<f64> {
    nearest_beat(beats, t).filter(|b| (b - t).abs() <= tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_beat() {
        let beats = [0.5, 1.0, 1.5, 2.0];
        assert_eq!(nearest_beat(&beats, 1.1), Some(1.0));
        assert_eq!(nearest_beat(&beats, 1.25), Some(1.0));
        assert_eq!(nearest_beat(&beats, 9.0), Some(2.0));
        assert_eq!(nearest_beat(&beats, -1.0), Some(0.5));
        assert_eq!(nearest_beat(&[], 1.0), None);
    }

    #[test]
    fn test_snap_within_tolerance() {
        let beats = [0.5, 1.0, 1.5, 2.0];
        assert_eq!(snap_to_beat(&beats, 1.1, 0.15), Some(1.0));
        assert_eq!(snap_to_beat(&beats, 1.4, 0.15), Some(1.5));
        assert_eq!(snap_to_beat(&beats, 1.25, 0.1), None);
        assert_eq!(snap_to_beat(&beats, 3.0, 0.15), None);
        assert_eq!(snap_to_beat(&[], 1.0, 0.15), None);
    }
}
