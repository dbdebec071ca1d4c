//! Per-chunk diarization stage
//!
//! Runs the diarization model over one chunk, builds duration-weighted
//! speaker profiles, persists the detailed result blob, and returns only a
//! lightweight manifest.

use crate::audio::chunker::ChunkDescriptor;
use crate::audio::wav;
use crate::config::PipelineConfig;
use crate::diarization::types::{ChunkDiarization, ChunkManifest, LocalSegment, SpeakerProfile};
use crate::error::PipelineError;
use crate::keys;
use crate::models::{EmbeddingModel, ModelSet};
use crate::storage::{put_json, BlobStore};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Diarizes one chunk at a time.
pub struct ChunkDiarizer {
    store: Arc<dyn BlobStore>,
    models: ModelSet,
    config: PipelineConfig,
}

impl ChunkDiarizer {
    pub fn new(store: Arc<dyn BlobStore>, models: ModelSet, config: PipelineConfig) -> Self {
        Self {
            store,
            models,
            config,
        }
    }

    /// Diarize the chunk's audio and persist the detailed result.
    ///
    /// A chunk with no detected speech succeeds with zero speakers; model
    /// failure is fatal for the chunk.
    pub async fn diarize_chunk(
        &self,
        bucket: &str,
        chunk: &ChunkDescriptor,
        scratch: &Path,
    ) -> Result<ChunkManifest, PipelineError> {
        let local = scratch.join(format!("diarize_{:02}.wav", chunk.chunk_index));
        self.store.download(bucket, &chunk.chunk_key, &local).await?;
        let samples = wav::read_samples_f32(&local)?;
        let chunk_seconds = samples.len() as f64 / wav::SAMPLE_RATE as f64;

        let turns = self
            .models
            .diarization
            .diarize(&samples, wav::SAMPLE_RATE)
            .await?;

        let segments: Vec<LocalSegment> = turns
            .into_iter()
            .filter(|turn| turn.end > turn.start)
            .map(|turn| LocalSegment {
                local_start: turn.start.max(0.0),
                local_end: turn.end.min(chunk_seconds),
                local_speaker: turn.speaker,
            })
            .filter(|segment| segment.local_end > segment.local_start)
            .collect();

        let speakers = self.build_profiles(&samples, &segments).await?;
        let speaker_count = distinct_speakers(&segments);
        debug!(
            chunk_index = chunk.chunk_index,
            segments = segments.len(),
            speakers = speaker_count,
            "chunk diarized"
        );

        let result_key = keys::chunk_diarization_for(&chunk.chunk_key, chunk.chunk_index);
        let detail = ChunkDiarization {
            chunk_index: chunk.chunk_index,
            offset: chunk.offset,
            effective_start: chunk.effective_start,
            effective_end: chunk.effective_end,
            segments,
            speakers,
            speaker_count,
        };
        put_json(self.store.as_ref(), bucket, &result_key, &detail).await?;

        info!(
            chunk_index = chunk.chunk_index,
            %result_key, speaker_count, "chunk diarization persisted"
        );
        Ok(ChunkManifest {
            chunk_index: chunk.chunk_index,
            result_key,
            speaker_count,
        })
    }

    /// Duration-weighted mean embedding per local speaker, over segments of
    /// at least the configured minimum length.
    async fn build_profiles(
        &self,
        samples: &[f32],
        segments: &[LocalSegment],
    ) -> Result<BTreeMap<String, SpeakerProfile>, PipelineError> {
        let mut profiles = BTreeMap::new();
        let mut by_speaker: BTreeMap<&str, Vec<&LocalSegment>> = BTreeMap::new();
        for segment in segments {
            by_speaker
                .entry(segment.local_speaker.as_str())
                .or_default()
                .push(segment);
        }

        for (speaker, speaker_segments) in by_speaker {
            let eligible: Vec<&LocalSegment> = speaker_segments
                .iter()
                .copied()
                .filter(|s| s.duration() >= self.config.min_profile_segment)
                .collect();
            if eligible.is_empty() {
                continue;
            }

            let embedding = weighted_mean_embedding(
                self.models.embedding.as_ref(),
                samples,
                &eligible,
            )
            .await?;

            profiles.insert(
                speaker.to_string(),
                SpeakerProfile {
                    embedding,
                    total_duration: eligible.iter().map(|s| s.duration()).sum(),
                    segment_count: eligible.len(),
                },
            );
        }
        Ok(profiles)
    }
}

async fn weighted_mean_embedding(
    model: &dyn EmbeddingModel,
    samples: &[f32],
    segments: &[&LocalSegment],
) -> Result<Vec<f32>, PipelineError> {
    let dimension = model.dimension();
    let mut accumulated = vec![0.0f32; dimension];
    let mut total_weight = 0.0f64;

    for segment in segments {
        let embedding = model
            .embed_span(
                samples,
                wav::SAMPLE_RATE,
                segment.local_start,
                segment.local_end,
            )
            .await?;
        if embedding.len() != dimension {
            return Err(PipelineError::model(format!(
                "embedding model returned {} dims, expected {dimension}",
                embedding.len()
            )));
        }

        let weight = segment.duration();
        for (acc, value) in accumulated.iter_mut().zip(embedding) {
            *acc += value * weight as f32;
        }
        total_weight += weight;
    }

    for value in accumulated.iter_mut() {
        *value /= total_weight as f32;
    }
    Ok(accumulated)
}

fn distinct_speakers(segments: &[LocalSegment]) -> usize {
    let mut names: Vec<&str> = segments.iter().map(|s| s.local_speaker.as_str()).collect();
    names.sort();
    names.dedup();
    names.len()
}
