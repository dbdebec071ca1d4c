//! WAV helpers
//!
//! Probe, read, write and cut the pipeline's normalized format: mono,
//! 16 kHz, 16-bit signed little-endian PCM.

use crate::error::PipelineError;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;

/// Sample rate of normalized audio.
pub const SAMPLE_RATE: u32 = 16_000;

/// Basic facts about a WAV file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WavInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    /// Samples per channel.
    pub frame_count: u32,
    pub duration_seconds: f64,
}

impl WavInfo {
    /// Whether this file already matches the normalized format.
    pub fn is_normalized(&self) -> bool {
        self.channels == 1 && self.sample_rate == SAMPLE_RATE && self.bits_per_sample == 16
    }
}

/// Read header-level facts without decoding samples.
pub fn probe(path: &Path) -> Result<WavInfo, PipelineError> {
    let reader = WavReader::open(path)
        .map_err(|e| PipelineError::corrupt(format!("unreadable WAV {}: {e}", path.display())))?;
    let spec = reader.spec();
    let frame_count = reader.duration();

    Ok(WavInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        bits_per_sample: spec.bits_per_sample,
        frame_count,
        duration_seconds: frame_count as f64 / spec.sample_rate as f64,
    })
}

/// Read all samples of a normalized WAV.
pub fn read_samples(path: &Path) -> Result<Vec<i16>, PipelineError> {
    let mut reader = WavReader::open(path)
        .map_err(|e| PipelineError::corrupt(format!("unreadable WAV {}: {e}", path.display())))?;
    let spec = reader.spec();
    if spec.channels != 1 || spec.sample_rate != SAMPLE_RATE || spec.bits_per_sample != 16 {
        return Err(PipelineError::corrupt(format!(
            "expected mono 16 kHz s16le WAV, got {} ch {} Hz {} bit at {}",
            spec.channels,
            spec.sample_rate,
            spec.bits_per_sample,
            path.display()
        )));
    }

    reader
        .samples::<i16>()
        .collect::<Result<Vec<i16>, _>>()
        .map_err(|e| PipelineError::corrupt(format!("decoding {}: {e}", path.display())))
}

/// Read a normalized WAV as float samples in [-1, 1) for model input.
pub fn read_samples_f32(path: &Path) -> Result<Vec<f32>, PipelineError> {
    Ok(read_samples(path)?
        .into_iter()
        .map(|s| s as f32 / i16::MAX as f32)
        .collect())
}

/// Write samples as a normalized WAV.
pub fn write_normalized(path: &Path, samples: &[i16]) -> Result<(), PipelineError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)
        .map_err(|e| PipelineError::corrupt(format!("creating {}: {e}", path.display())))?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| PipelineError::corrupt(format!("writing {}: {e}", path.display())))?;
    }
    writer
        .finalize()
        .map_err(|e| PipelineError::corrupt(format!("finalizing {}: {e}", path.display())))
}

/// Slice `[start, end)` seconds out of normalized samples, clamped to the
/// available range.
pub fn cut_span(samples: &[i16], start: f64, end: f64) -> &[i16] {
    let start_idx = seconds_to_frame(start).min(samples.len());
    let end_idx = seconds_to_frame(end).min(samples.len());
    &samples[start_idx..end_idx.max(start_idx)]
}

fn seconds_to_frame(seconds: f64) -> usize {
    (seconds.max(0.0) * SAMPLE_RATE as f64).round() as usize
}
