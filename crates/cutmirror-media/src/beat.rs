//! Tempo and beat-grid estimation.
//!
//! Pipeline: frame RMS energy -> half-wave rectified energy flux (onset
//! envelope) -> tempo-weighted autocorrelation for the beat period ->
//! comb-filter phase search -> beat positions refined to local onset peaks.
//!
//! The grid is an ornament for cut timing. Silent or aperiodic audio yields
//! no grid at all rather than a guess.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use cutmirror_models::{nearest_beat, snap_to_beat};

use crate::audio::decode_mono_pcm;
use crate::command::FfmpegRunner;
use crate::error::MediaResult;
use crate::probe::probe_media;

/// Detected rhythm of an audio track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatGrid {
    pub tempo_bpm: f64,
    /// Beat timestamps in seconds, ascending
    pub beats: Vec<f64>,
    /// Periodicity strength in 0..1
    pub confidence: f64,
}

impl BeatGrid {
    pub fn is_empty(&self) -> bool {
        self.beats.is_empty()
    }

    /// Closest beat to `t`.
    pub fn nearest(&self, t: f64) -> Option<f64> {
        nearest_beat(&self.beats, t)
    }

    /// Closest beat within `tolerance` seconds of `t`.
    pub fn snap(&self, t: f64, tolerance: f64) -> Option<f64> {
        snap_to_beat(&self.beats, t, tolerance)
    }

    /// Fraction of `points` lying within `tolerance` of a beat.
    pub fn alignment_ratio(&self, points: &[f64], tolerance: f64) -> Option<f64> {
        if points.is_empty() || self.beats.is_empty() {
            return None;
        }
        let aligned = points.iter().filter(|p| self.snap(**p, tolerance).is_some()).count();
        Some(aligned as f64 / points.len() as f64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatConfig {
    pub sample_rate: u32,
    /// Analysis frame length in samples (frames do not overlap)
    pub hop_size: usize,
    pub min_bpm: f64,
    pub max_bpm: f64,
    /// Tempo prior center; resolves octave ambiguity
    pub preferred_bpm: f64,
    /// Frame RMS below which the whole track counts as silent
    pub silence_rms: f32,
    pub min_confidence: f64,
    /// Tracks shorter than this are not analyzed
    pub min_duration_secs: f64,
}

impl Default for BeatConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22_050,
            hop_size: 256,
            min_bpm: 70.0,
            max_bpm: 180.0,
            preferred_bpm: 120.0,
            silence_rms: 1e-3,
            min_confidence: 0.1,
            min_duration_secs: 3.0,
        }
    }
}

impl BeatConfig {
    fn frame_rate(&self) -> f64 {
        self.sample_rate as f64 / self.hop_size as f64
    }
}

/// Estimate a beat grid from mono samples at `config.sample_rate`.
pub fn analyze_samples(samples: &[f32], config: &BeatConfig) -> Option<BeatGrid> {
    let duration = samples.len() as f64 / config.sample_rate as f64;
    if duration < config.min_duration_secs || config.hop_size == 0 {
        debug!(duration = duration, "Audio too short for beat analysis");
        return None;
    }

    let energy = frame_rms(samples, config.hop_size);
    let loudest = energy.iter().copied().fold(0.0f32, f32::max);
    if loudest < config.silence_rms {
        debug!(loudest = loudest, "Audio is silent, no beat grid");
        return None;
    }

    let envelope = onset_envelope(&energy);
    let frame_rate = config.frame_rate();
    let min_lag = (60.0 * frame_rate / config.max_bpm).floor().max(1.0) as usize;
    let max_lag = (60.0 * frame_rate / config.min_bpm).ceil() as usize;

    let (period, confidence) = estimate_period(&envelope, min_lag, max_lag, frame_rate, config.preferred_bpm)?;
    if confidence < config.min_confidence {
        debug!(confidence = confidence, "Onset envelope not periodic enough");
        return None;
    }

    let frame_secs = 1.0 / frame_rate;
    let beats: Vec<f64> = track_beats(&envelope, period)
        .into_iter()
        .map(|frame| (frame as f64 + 0.5) * frame_secs)
        .collect();
    if beats.len() < 2 {
        return None;
    }

    Some(BeatGrid {
        tempo_bpm: 60.0 * frame_rate / period,
        beats,
        confidence,
    })
}

fn frame_rms(samples: &[f32], hop: usize) -> Vec<f32> {
    samples
        .chunks(hop)
        .map(|frame| {
            let sum: f32 = frame.iter().map(|s| s * s).sum();
            (sum / frame.len() as f32).sqrt()
        })
        .collect()
}

/// Positive frame-to-frame energy increase.
fn onset_envelope(energy: &[f32]) -> Vec<f64> {
    let mut envelope = Vec::with_capacity(energy.len());
    let mut previous = 0.0f32;
    for &e in energy {
        envelope.push(f64::from((e - previous).max(0.0)));
        previous = e;
    }
    envelope
}

/// Beat period in (fractional) frames and its normalized autocorrelation.
fn estimate_period(
    envelope: &[f64],
    min_lag: usize,
    max_lag: usize,
    frame_rate: f64,
    preferred_bpm: f64,
) -> Option<(f64, f64)> {
    let n = envelope.len();
    let max_lag = max_lag.min(n.saturating_sub(1) / 2);
    if min_lag + 1 >= max_lag {
        return None;
    }

    let mean = envelope.iter().sum::<f64>() / n as f64;
    let centered: Vec<f64> = envelope.iter().map(|v| v - mean).collect();
    let variance = centered.iter().map(|v| v * v).sum::<f64>() / n as f64;
    if variance <= f64::EPSILON {
        return None;
    }

    let autocorr = |lag: usize| -> f64 {
        let sum: f64 = centered[..n - lag]
            .iter()
            .zip(&centered[lag..])
            .map(|(a, b)| a * b)
            .sum();
        sum / (n - lag) as f64 / variance
    };

    let correlations: Vec<f64> = (min_lag..=max_lag).map(autocorr).collect();
    let weighted = |i: usize| {
        let bpm = 60.0 * frame_rate / (min_lag + i) as f64;
        let octaves = (bpm / preferred_bpm).log2();
        correlations[i] * (-0.5 * octaves * octaves).exp()
    };

    let best = (0..correlations.len()).max_by(|a, b| {
        weighted(*a)
            .partial_cmp(&weighted(*b))
            .unwrap_or(std::cmp::Ordering::Equal)
    })?;

    let mut period = (min_lag + best) as f64;
    if best > 0 && best + 1 < correlations.len() {
        let (l, c, r) = (correlations[best - 1], correlations[best], correlations[best + 1]);
        let denominator = l - 2.0 * c + r;
        if denominator < 0.0 {
            period += (0.5 * (l - r) / denominator).clamp(-0.5, 0.5);
        }
    }

    Some((period, correlations[best].clamp(0.0, 1.0)))
}

/// Frame indices of beats for a given period.
fn track_beats(envelope: &[f64], period: f64) -> Vec<usize> {
    let n = envelope.len();
    if n == 0 || period < 1.0 {
        return Vec::new();
    }

    let peak_near = |center: usize, radius: usize| -> (usize, f64) {
        let lo = center.saturating_sub(radius);
        let hi = (center + radius).min(n - 1);
        (lo..=hi)
            .map(|i| (i, envelope[i]))
            .fold((center.min(n - 1), f64::MIN), |best, cur| if cur.1 > best.1 { cur } else { best })
    };

    let phase_score = |phase: usize| -> f64 {
        let mut score = 0.0;
        let mut x = phase as f64;
        while (x.round() as usize) < n {
            score += peak_near(x.round() as usize, 1).1;
            x += period;
        }
        score
    };

    let phases = period.ceil() as usize;
    let best_phase = (0..phases.min(n))
        .max_by(|a, b| {
            phase_score(*a)
                .partial_cmp(&phase_score(*b))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(0);

    let mut beats = Vec::new();
    let mut x = best_phase as f64;
    while (x.round() as usize) < n {
        let center = x.round() as usize;
        let (peak, strength) = peak_near(center, 2);
        let frame = if strength > 0.0 { peak } else { center };
        if beats.last().map_or(true, |last| frame > *last) {
            beats.push(frame);
        }
        // Re-anchor on the detected onset so period error does not accumulate.
        let anchor = if strength > 0.0 { peak as f64 } else { x };
        x = anchor.max(x - period / 2.0) + period;
    }
    beats
}

/// Audio beat/tempo detector.
#[async_trait]
pub trait BeatDetector: Send + Sync {
    /// `Ok(None)` when the media has no usable rhythm (no audio, silence,
    /// no periodicity).
    async fn detect(&self, media: &Path) -> MediaResult<Option<BeatGrid>>;
}

/// FFmpeg-decoding beat detector.
#[derive(Debug, Clone, Default)]
pub struct FfmpegBeatDetector {
    config: BeatConfig,
    runner: FfmpegRunner,
}

impl FfmpegBeatDetector {
    pub fn new(config: BeatConfig, runner: FfmpegRunner) -> Self {
        Self { config, runner }
    }
}

#[async_trait]
impl BeatDetector for FfmpegBeatDetector {
    async fn detect(&self, media: &Path) -> MediaResult<Option<BeatGrid>> {
        let info = probe_media(media).await?;
        if !info.has_audio {
            debug!(media = %media.display(), "No audio stream, skipping beat detection");
            return Ok(None);
        }

        let samples = decode_mono_pcm(&self.runner, media, self.config.sample_rate).await?;
        let config = self.config.clone();
        let grid = tokio::task::spawn_blocking(move || analyze_samples(&samples, &config))
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))?;

        match &grid {
            Some(g) => info!(
                media = %media.display(),
                tempo_bpm = format!("{:.1}", g.tempo_bpm),
                beats = g.beats.len(),
                confidence = format!("{:.2}", g.confidence),
                "Beat grid detected"
            ),
            None => info!(media = %media.display(), "No beat grid detected"),
        }
        Ok(grid)
    }
}
