//! Pipeline configuration
//!
//! All tunables for the chunked diarization/transcription pipeline with the
//! production defaults. Values are validated once when a driver is built.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};

/// Configuration for the full pipeline.
///
/// Chunking defaults (510 s windows, 30 s overlap, 480 s effective zone) keep
/// per-chunk memory around `510 × 16000 × 4` bytes while leaving enough
/// overlap for speaker identity to carry across window boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Window length D in seconds.
    pub chunk_duration: f64,

    /// Overlap O between adjacent windows in seconds.
    pub overlap_duration: f64,

    /// Chunk-local end E of the effective zone in seconds (D − O).
    pub effective_window_end: f64,

    /// Cosine similarity threshold τ for cross-chunk speaker clustering.
    pub similarity_threshold: f32,

    /// Maximum gap in seconds when coalescing adjacent same-speaker segments.
    pub coalesce_gap: f64,

    /// Minimum segment duration in seconds contributing to a speaker profile.
    pub min_profile_segment: f64,

    /// Forced transcription language.
    pub stt_language: String,

    /// Beam search width for the speech-to-text model.
    pub stt_beam_size: usize,

    /// Per-item retry cap for retryable failures.
    pub max_retries: u32,

    /// Maximum serialized size of an inter-stage message in bytes.
    pub payload_cap_bytes: usize,

    /// Concurrent diarization workers.
    pub diarize_workers: usize,

    /// Concurrent transcription workers.
    pub transcribe_workers: usize,

    /// Wall-clock deadline per stage-item attempt in seconds.
    pub stage_deadline_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_duration: 510.0,
            overlap_duration: 30.0,
            effective_window_end: 480.0,
            similarity_threshold: 0.75,
            coalesce_gap: 0.5,
            min_profile_segment: 0.5,
            stt_language: "ja".to_string(),
            stt_beam_size: 5,
            max_retries: 3,
            payload_cap_bytes: 262_144,
            diarize_workers: 4,
            transcribe_workers: 4,
            stage_deadline_secs: 900,
        }
    }
}

impl PipelineConfig {
    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.chunk_duration <= 0.0 {
            return Err(PipelineError::corrupt("chunk_duration must be positive"));
        }
        if self.overlap_duration < 0.0 || self.overlap_duration >= self.chunk_duration {
            return Err(PipelineError::corrupt(
                "overlap_duration must be in [0, chunk_duration)",
            ));
        }
        if self.effective_window_end <= 0.0 || self.effective_window_end > self.chunk_duration {
            return Err(PipelineError::corrupt(
                "effective_window_end must be in (0, chunk_duration]",
            ));
        }
        // Effective zones tile the recording only when the effective window
        // matches the window stride.
        if (self.effective_window_end - self.chunk_stride()).abs() > 1e-9 {
            return Err(PipelineError::corrupt(
                "effective_window_end must equal chunk_duration - overlap_duration",
            ));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(PipelineError::corrupt(
                "similarity_threshold must be in [0, 1]",
            ));
        }
        if self.stt_beam_size == 0 {
            return Err(PipelineError::corrupt("stt_beam_size must be at least 1"));
        }
        if self.diarize_workers == 0 || self.transcribe_workers == 0 {
            return Err(PipelineError::corrupt("worker counts must be at least 1"));
        }
        if self.payload_cap_bytes == 0 {
            return Err(PipelineError::corrupt("payload_cap_bytes must be positive"));
        }
        Ok(())
    }

    /// Stride between adjacent chunk offsets (D − O).
    pub fn chunk_stride(&self) -> f64 {
        self.chunk_duration - self.overlap_duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_stride(), 480.0);
    }

    #[test]
    fn rejects_overlap_not_smaller_than_window() {
        let config = PipelineConfig {
            overlap_duration: 510.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_effective_window_that_cannot_tile() {
        let config = PipelineConfig {
            effective_window_end: 470.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let config = PipelineConfig {
            similarity_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
