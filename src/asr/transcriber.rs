//! Per-segment transcription stage
//!
//! Downloads one segment clip, runs speech-to-text with the configured
//! language and beam width, and persists the result blob. The text is never
//! returned inline.

use crate::asr::types::{TranscribeManifest, TranscribeResult};
use crate::audio::splitter::SegmentFile;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::keys;
use crate::models::{ModelSet, SttOptions};
use crate::storage::{put_json, BlobStore};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Transcribes one segment clip at a time.
pub struct SegmentTranscriber {
    store: Arc<dyn BlobStore>,
    models: ModelSet,
    config: PipelineConfig,
}

impl SegmentTranscriber {
    pub fn new(store: Arc<dyn BlobStore>, models: ModelSet, config: PipelineConfig) -> Self {
        Self {
            store,
            models,
            config,
        }
    }

    /// Transcribe a clip and persist the `TranscribeResult` blob.
    pub async fn transcribe_segment(
        &self,
        bucket: &str,
        segment_file: &SegmentFile,
        scratch: &Path,
    ) -> Result<TranscribeManifest, PipelineError> {
        let local = scratch.join(format!("stt_{}", keys::base_name(&segment_file.key)));
        self.store
            .download(bucket, &segment_file.key, &local)
            .await?;

        let options = SttOptions {
            language: self.config.stt_language.clone(),
            beam_size: self.config.stt_beam_size,
        };
        debug!(key = %segment_file.key, language = %options.language, "transcribing clip");
        let spans = self.models.stt.transcribe(&local, &options).await?;
        let text: String = spans.into_iter().map(|span| span.text).collect();

        let result_key = keys::transcribe_result(&segment_file.key);
        let result = TranscribeResult {
            speaker: segment_file.speaker.clone(),
            start: segment_file.start,
            end: segment_file.end,
            text,
        };
        put_json(self.store.as_ref(), bucket, &result_key, &result).await?;

        info!(%result_key, speaker = %result.speaker, "segment transcribed");
        Ok(TranscribeManifest {
            result_key,
            speaker: segment_file.speaker.clone(),
            start: segment_file.start,
            end: segment_file.end,
        })
    }
}
