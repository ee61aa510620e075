//! Decoded audio access.

use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// Decode the first audio stream to mono f32 samples at `sample_rate`.
pub async fn decode_mono_pcm(runner: &FfmpegRunner, input: &Path, sample_rate: u32) -> MediaResult<Vec<f32>> {
    let raw = NamedTempFile::new()?;

    let cmd = FfmpegCommand::new(input, raw.path()).output_args([
        "-vn".to_string(),
        "-ac".to_string(),
        "1".to_string(),
        "-ar".to_string(),
        sample_rate.to_string(),
        "-f".to_string(),
        "f32le".to_string(),
    ]);
    runner.run(&cmd).await?;

    let bytes = tokio::fs::read(raw.path()).await?;
    let samples = samples_from_le_bytes(&bytes);
    debug!(
        input = %input.display(),
        samples = samples.len(),
        sample_rate = sample_rate,
        "Decoded audio"
    );
    Ok(samples)
}

/// Raw f32le bytes to samples (4 bytes per sample, trailing bytes dropped).
pub fn samples_from_le_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
