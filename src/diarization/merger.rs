//! Cross-chunk speaker merging
//!
//! Resolves chunk-local speaker labels into one global label space, rewrites
//! chunk-local segments onto the global timeline, and reconciles the
//! overlapping tails of adjacent chunks into a single monotone timeline.

use crate::config::PipelineConfig;
use crate::diarization::clustering::{cluster_embeddings, speaker_label};
use crate::diarization::types::{ChunkDiarization, ChunkManifest, GlobalSegment};
use crate::error::PipelineError;
use crate::keys;
use crate::storage::{get_json, put_json, BlobStore};
use ndarray::Array2;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of the merge stage.
#[derive(Debug, Clone)]
pub struct MergeOutput {
    pub segments_key: String,
    pub global_speaker_count: usize,
}

/// A global-timeline segment candidate still carrying its chunk's effective
/// window.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub start: f64,
    pub end: f64,
    pub speaker: String,
    pub effective_start: f64,
    pub effective_end: f64,
}

/// Merges per-chunk diarization results into the global segment timeline.
pub struct SpeakerMerger {
    store: Arc<dyn BlobStore>,
    config: PipelineConfig,
}

impl SpeakerMerger {
    pub fn new(store: Arc<dyn BlobStore>, config: PipelineConfig) -> Self {
        Self { store, config }
    }

    /// Load every chunk's detailed result, cluster speaker embeddings into
    /// global labels, and persist the reconciled segment timeline.
    ///
    /// Any detail-blob load failure is fatal: global identity depends on
    /// having every chunk's embeddings.
    pub async fn merge(
        &self,
        bucket: &str,
        audio_key: &str,
        chunk_results: &[ChunkManifest],
    ) -> Result<MergeOutput, PipelineError> {
        let segments_key = keys::merged_segments(keys::base_name(audio_key));

        let mut manifests: Vec<&ChunkManifest> = chunk_results.iter().collect();
        manifests.sort_by_key(|m| m.chunk_index);

        let mut chunks = Vec::with_capacity(manifests.len());
        for manifest in &manifests {
            let detail: ChunkDiarization =
                get_json(self.store.as_ref(), bucket, &manifest.result_key).await?;
            chunks.push(detail);
        }

        if chunks.iter().all(|c| c.is_empty()) {
            warn!(audio_key, "all chunks are empty, emitting empty timeline");
            put_json(
                self.store.as_ref(),
                bucket,
                &segments_key,
                &Vec::<GlobalSegment>::new(),
            )
            .await?;
            return Ok(MergeOutput {
                segments_key,
                global_speaker_count: 0,
            });
        }

        let (mapping, global_speaker_count) =
            build_speaker_mapping(&chunks, self.config.similarity_threshold)?;
        for ((chunk_index, local), global) in &mapping {
            debug!(chunk_index, %local, %global, "speaker mapped");
        }

        let candidates = globalize_segments(&chunks, &mapping);
        let merged = reconcile(candidates, self.config.coalesce_gap);
        info!(
            audio_key,
            global_speaker_count,
            segments = merged.len(),
            "speaker merge complete"
        );

        put_json(self.store.as_ref(), bucket, &segments_key, &merged).await?;
        Ok(MergeOutput {
            segments_key,
            global_speaker_count,
        })
    }
}

/// Cluster every speaker profile across chunks and label clusters in first
/// appearance order.
fn build_speaker_mapping(
    chunks: &[ChunkDiarization],
    similarity_threshold: f32,
) -> Result<(HashMap<(u32, String), String>, usize), PipelineError> {
    let mut identities: Vec<(u32, String)> = Vec::new();
    let mut embeddings: Vec<&[f32]> = Vec::new();
    for chunk in chunks {
        for (local_speaker, profile) in &chunk.speakers {
            identities.push((chunk.chunk_index, local_speaker.clone()));
            embeddings.push(&profile.embedding);
        }
    }

    if embeddings.is_empty() {
        return Ok((HashMap::new(), 0));
    }

    let dimension = embeddings[0].len();
    if dimension == 0 || embeddings.iter().any(|e| e.len() != dimension) {
        return Err(PipelineError::corrupt(
            "speaker profiles disagree on embedding dimension",
        ));
    }

    let mut matrix = Array2::<f32>::zeros((embeddings.len(), dimension));
    for (row, embedding) in embeddings.iter().enumerate() {
        for (col, &value) in embedding.iter().enumerate() {
            matrix[(row, col)] = value;
        }
    }

    let labels = cluster_embeddings(&matrix, similarity_threshold)?;
    if labels.len() != identities.len() {
        return Err(PipelineError::ClusteringInvariant {
            message: format!(
                "{} labels for {} profiles",
                labels.len(),
                identities.len()
            ),
        });
    }

    let count = labels.iter().copied().max().map_or(0, |m| m + 1);
    let mapping = identities
        .into_iter()
        .zip(labels)
        .map(|(identity, label)| (identity, speaker_label(label)))
        .collect();
    Ok((mapping, count))
}

/// Rewrite chunk-local segments into global-time candidates.
///
/// A local speaker without a profile (every segment too short) is not in the
/// mapping and keeps a chunk-scoped `UNKNOWN_` label.
fn globalize_segments(
    chunks: &[ChunkDiarization],
    mapping: &HashMap<(u32, String), String>,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for chunk in chunks {
        for segment in &chunk.segments {
            let identity = (chunk.chunk_index, segment.local_speaker.clone());
            let speaker = mapping
                .get(&identity)
                .cloned()
                .unwrap_or_else(|| format!("UNKNOWN_{}", segment.local_speaker));

            candidates.push(Candidate {
                start: segment.local_start + chunk.offset,
                end: segment.local_end + chunk.offset,
                speaker,
                effective_start: chunk.effective_start,
                effective_end: chunk.effective_end,
            });
        }
    }
    candidates
}

/// Clip candidates to their effective windows, order them, and coalesce
/// near-adjacent same-speaker runs into the final non-overlapping timeline.
pub fn reconcile(candidates: Vec<Candidate>, coalesce_gap: f64) -> Vec<GlobalSegment> {
    let mut clipped: Vec<GlobalSegment> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let start = candidate.start.max(candidate.effective_start);
            let end = candidate.end.min(candidate.effective_end);
            (start < end).then_some(GlobalSegment {
                start,
                end,
                speaker: candidate.speaker,
            })
        })
        .collect();

    clipped.sort_by(|a, b| {
        a.start
            .total_cmp(&b.start)
            .then(a.end.total_cmp(&b.end))
            .then(a.speaker.cmp(&b.speaker))
    });

    let mut merged: Vec<GlobalSegment> = Vec::with_capacity(clipped.len());
    for segment in clipped {
        match merged.last_mut() {
            Some(tail)
                if tail.speaker == segment.speaker
                    && segment.start - tail.end < coalesce_gap =>
            {
                tail.end = tail.end.max(segment.end);
            }
            Some(tail) if segment.start < tail.end => {
                // Different speaker starting inside the tail: keep the
                // timeline non-overlapping by starting where the tail ends.
                let start = tail.end;
                if start < segment.end {
                    merged.push(GlobalSegment {
                        start,
                        end: segment.end,
                        speaker: segment.speaker,
                    });
                }
            }
            _ => merged.push(segment),
        }
    }
    merged
}
