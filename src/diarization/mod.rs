//! Speaker Diarization Module
//!
//! Per-chunk diarization plus cross-chunk speaker identity resolution.
//! Chunks are diarized independently in local time; the merger clusters
//! per-chunk speaker embeddings into one global label space and reconciles
//! the overlapping windows into a single timeline.

pub mod clustering;
pub mod diarizer;
pub mod merger;
pub mod types;

pub use diarizer::ChunkDiarizer;
pub use merger::{MergeOutput, SpeakerMerger};
pub use types::*;
