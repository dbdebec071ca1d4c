//! Audio chunking
//!
//! Splits the normalized waveform into fixed-length overlapping windows.
//! Each window carries an effective zone; effective zones of adjacent
//! windows abut at the midpoint of the overlap, so together they tile
//! `[0, T)` with no gaps and no double coverage.

use crate::audio::wav;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::keys;
use crate::storage::BlobStore;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// One chunk of the recording, with global timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkDescriptor {
    /// 0-based dense index.
    pub chunk_index: u32,
    /// Key of the chunk's audio blob.
    pub chunk_key: String,
    /// Global start of the window in seconds.
    pub offset: f64,
    /// Window length in seconds (full size except possibly the last chunk).
    pub duration: f64,
    /// Global start of the effective zone.
    pub effective_start: f64,
    /// Global end of the effective zone.
    pub effective_end: f64,
}

/// A planned window before any audio is cut.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowPlan {
    pub index: u32,
    pub offset: f64,
    pub duration: f64,
    pub effective_start: f64,
    pub effective_end: f64,
}

/// Plan overlapping windows covering `[0, total)` seconds.
///
/// Window `i` starts at `i · (D − O)`. The first effective zone starts at 0,
/// later ones at `offset + O/2`; each effective zone ends where the next one
/// starts, and the last ends at `total`.
pub fn plan_windows(
    total: f64,
    config: &PipelineConfig,
) -> Result<Vec<WindowPlan>, PipelineError> {
    if total <= 0.0 {
        return Err(PipelineError::corrupt("recording has zero duration"));
    }

    let window = config.chunk_duration;
    let overlap = config.overlap_duration;
    let stride = config.chunk_stride();

    let mut offsets = vec![0.0f64];
    while offsets.last().unwrap() + window < total {
        offsets.push(offsets.last().unwrap() + stride);
    }

    let count = offsets.len();
    let effective_start = |i: usize| -> f64 {
        if i == 0 {
            0.0
        } else {
            offsets[i] + overlap / 2.0
        }
    };

    let plans = offsets
        .iter()
        .enumerate()
        .map(|(i, &offset)| WindowPlan {
            index: i as u32,
            offset,
            duration: window.min(total - offset),
            effective_start: effective_start(i),
            effective_end: if i + 1 < count {
                effective_start(i + 1)
            } else {
                total
            },
        })
        .collect();

    Ok(plans)
}

/// Cuts chunk audio and publishes it to the blob store.
pub struct Chunker {
    store: Arc<dyn BlobStore>,
    config: PipelineConfig,
}

impl Chunker {
    pub fn new(store: Arc<dyn BlobStore>, config: PipelineConfig) -> Self {
        Self { store, config }
    }

    /// Split the normalized WAV at `audio_key` into chunk blobs.
    pub async fn chunk(
        &self,
        bucket: &str,
        audio_key: &str,
        scratch: &Path,
    ) -> Result<Vec<ChunkDescriptor>, PipelineError> {
        let base = keys::base_name(audio_key);
        let local = scratch.join("chunker_input.wav");
        self.store.download(bucket, audio_key, &local).await?;

        let samples = wav::read_samples(&local)?;
        let total = samples.len() as f64 / wav::SAMPLE_RATE as f64;
        let plans = plan_windows(total, &self.config)?;
        info!(
            audio_key,
            total_seconds = total,
            chunks = plans.len(),
            "chunking normalized audio"
        );

        let mut descriptors = Vec::with_capacity(plans.len());
        for plan in plans {
            let chunk_key = keys::chunk_wav(base, plan.index);
            let span = wav::cut_span(&samples, plan.offset, plan.offset + plan.duration);

            let chunk_path = scratch.join(format!("chunk_{:02}.wav", plan.index));
            wav::write_normalized(&chunk_path, span)?;
            self.store
                .upload(&chunk_path, bucket, &chunk_key, "audio/wav")
                .await?;
            debug!(%chunk_key, offset = plan.offset, "chunk uploaded");

            descriptors.push(ChunkDescriptor {
                chunk_index: plan.index,
                chunk_key,
                offset: plan.offset,
                duration: plan.duration,
                effective_start: plan.effective_start,
                effective_end: plan.effective_end,
            });
        }

        Ok(descriptors)
    }
}
