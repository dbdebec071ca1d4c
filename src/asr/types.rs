//! Transcription type definitions

use serde::{Deserialize, Serialize};

/// Transcribed text for one segment, persisted as a blob. `text` may be
/// empty when the model hears nothing it can recognize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscribeResult {
    pub speaker: String,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Lightweight manifest returned by the transcription stage; the text itself
/// stays in the blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscribeManifest {
    pub result_key: String,
    pub speaker: String,
    pub start: f64,
    pub end: f64,
}
