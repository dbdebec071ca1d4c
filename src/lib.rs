//! Chunked diarization and transcription pipeline for long-form recordings.
//!
//! A recording is normalized to mono 16 kHz WAV, split into overlapping
//! windows that are diarized in parallel, speaker identities are unified
//! across windows by clustering voice embeddings, and the merged timeline is
//! sliced, transcribed and aggregated into one time-ordered transcript.
//! Stages communicate only through blobs at deterministic keys; in-flight
//! messages carry keys and small scalars.

pub mod asr;
pub mod audio;
pub mod config;
pub mod diarization;
pub mod error;
pub mod keys;
pub mod models;
pub mod pipeline;
pub mod storage;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use models::ModelSet;
pub use pipeline::{PipelineDriver, RunRequest, RunSummary};

/// Install a default `tracing` subscriber. Safe to call more than once;
/// later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().try_init();
}
