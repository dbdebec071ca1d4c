//! Inter-stage message envelopes
//!
//! Stages exchange small JSON manifests, never payloads. Whenever a list
//! risks exceeding the payload cap it is persisted as a blob and replaced by
//! its key; receivers accept either shape.

use crate::audio::chunker::ChunkDescriptor;
use crate::audio::splitter::{SegmentFile, SplitOutput};
use crate::diarization::types::ChunkManifest;
use crate::error::PipelineError;
use crate::keys;
use crate::storage::{get_json, put_json, BlobStore};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Serialized size of an envelope in bytes.
pub fn serialized_size<T: Serialize>(value: &T) -> Result<usize, PipelineError> {
    serde_json::to_vec(value)
        .map(|body| body.len())
        .map_err(|e| PipelineError::corrupt(format!("serializing envelope: {e}")))
}

/// Chunker → Diarizer, one message per chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiarizeRequest {
    pub bucket: String,
    pub chunk: ChunkDescriptor,
}

/// Diarizer → Merger. The chunk-results list rides inline while it fits
/// under the payload cap, otherwise only its blob key travels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRequest {
    pub bucket: String,
    pub audio_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_results: Option<Vec<ChunkManifest>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_results_key: Option<String>,
}

impl MergeRequest {
    /// Build the envelope, spilling the list to a blob when it would push
    /// the serialized message over `payload_cap_bytes`.
    pub async fn build(
        store: &dyn BlobStore,
        bucket: &str,
        audio_key: &str,
        chunk_results: Vec<ChunkManifest>,
        payload_cap_bytes: usize,
    ) -> Result<Self, PipelineError> {
        let inline = Self {
            bucket: bucket.to_string(),
            audio_key: audio_key.to_string(),
            chunk_results: Some(chunk_results),
            chunk_results_key: None,
        };
        if serialized_size(&inline)? <= payload_cap_bytes {
            return Ok(inline);
        }

        let key = keys::chunk_results_manifest(keys::base_name(audio_key));
        let chunk_results = inline.chunk_results.expect("list present before spill");
        debug!(%key, items = chunk_results.len(), "chunk results spilled to blob");
        put_json(store, bucket, &key, &chunk_results).await?;

        Ok(Self {
            bucket: bucket.to_string(),
            audio_key: audio_key.to_string(),
            chunk_results: None,
            chunk_results_key: Some(key),
        })
    }

    /// The chunk-results list, from either shape.
    pub async fn resolve_chunk_results(
        &self,
        store: &dyn BlobStore,
    ) -> Result<Vec<ChunkManifest>, PipelineError> {
        if let Some(results) = &self.chunk_results {
            return Ok(results.clone());
        }
        match &self.chunk_results_key {
            Some(key) => get_json(store, &self.bucket, key).await,
            None => Err(PipelineError::corrupt(
                "merge request carries neither chunk_results nor chunk_results_key",
            )),
        }
    }
}

/// Merger → Splitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitRequest {
    pub bucket: String,
    pub audio_key: String,
    pub segments_key: String,
    pub global_speaker_count: usize,
}

/// Splitter → Transcriber, one message per segment clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscribeRequest {
    pub bucket: String,
    pub segment_file: SegmentFile,
}

/// Transcriber → Aggregator. Only the manifest key travels; the aggregator
/// derives every result key itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRequest {
    pub bucket: String,
    pub segment_files_key: String,
    pub audio_key: String,
}

/// Splitter output as handed to the next stage: the manifest blob key, plus
/// the descriptor list while it fits under the cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitManifest {
    pub segment_files_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_files: Option<Vec<SegmentFile>>,
}

impl SplitManifest {
    pub fn from_output(output: SplitOutput, payload_cap_bytes: usize) -> Result<Self, PipelineError> {
        let full = Self {
            segment_files_key: output.segment_files_key,
            segment_files: Some(output.segment_files),
        };
        if serialized_size(&full)? <= payload_cap_bytes {
            return Ok(full);
        }
        debug!(
            key = %full.segment_files_key,
            "segment list over payload cap, passing key only"
        );
        Ok(Self {
            segment_files_key: full.segment_files_key,
            segment_files: None,
        })
    }

    /// The segment list, from either shape.
    pub async fn resolve_segment_files(
        &self,
        store: &dyn BlobStore,
        bucket: &str,
    ) -> Result<Vec<SegmentFile>, PipelineError> {
        match &self.segment_files {
            Some(files) => Ok(files.clone()),
            None => get_json(store, bucket, &self.segment_files_key).await,
        }
    }
}
