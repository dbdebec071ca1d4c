//! Diarization type definitions
//!
//! Chunk-local and global entities persisted between stages. Chunk-local
//! speaker labels are only meaningful inside one chunk; the merger maps them
//! onto the global label space.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A diarized turn in chunk-local time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalSegment {
    pub local_start: f64,
    pub local_end: f64,
    pub local_speaker: String,
}

impl LocalSegment {
    pub fn duration(&self) -> f64 {
        self.local_end - self.local_start
    }
}

/// Voice summary of one chunk-local speaker.
///
/// The embedding is the duration-weighted mean over that speaker's segments
/// of at least the configured minimum length; shorter segments stay in the
/// segment list but do not contribute here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerProfile {
    pub embedding: Vec<f32>,
    pub total_duration: f64,
    pub segment_count: usize,
}

/// Detailed per-chunk diarization result, persisted as a blob and referenced
/// in stage outputs only by key.
///
/// `speakers` is keyed by local label in a sorted map so downstream
/// embedding stacking is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkDiarization {
    pub chunk_index: u32,
    pub offset: f64,
    pub effective_start: f64,
    pub effective_end: f64,
    pub segments: Vec<LocalSegment>,
    pub speakers: BTreeMap<String, SpeakerProfile>,
    pub speaker_count: usize,
}

impl ChunkDiarization {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Lightweight manifest returned by the diarizer stage. Never carries
/// embeddings; those live only in the detailed blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkManifest {
    pub chunk_index: u32,
    pub result_key: String,
    pub speaker_count: usize,
}

/// A segment on the global timeline with a global speaker label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalSegment {
    pub start: f64,
    pub end: f64,
    pub speaker: String,
}
