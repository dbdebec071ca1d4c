//! Result aggregation
//!
//! Collects every per-segment transcription into the final time-ordered
//! transcript. This is the only stage that tolerates per-item blob
//! failures: a missing result becomes a placeholder entry so one bad blob
//! never discards the rest of the transcript.

use crate::asr::types::TranscribeResult;
use crate::audio::splitter::SegmentFile;
use crate::error::PipelineError;
use crate::keys;
use crate::storage::{get_json, BlobStore};
use std::sync::Arc;
use tracing::{error, info};

/// Placeholder text for a result blob that could not be loaded.
pub const READ_ERROR_TEXT: &str = "[read error]";

/// Result of the aggregation stage.
#[derive(Debug, Clone)]
pub struct AggregateOutput {
    pub transcript_key: String,
    pub segment_count: usize,
}

/// Builds the final transcript blob.
pub struct ResultAggregator {
    store: Arc<dyn BlobStore>,
}

impl ResultAggregator {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Load every transcription result derivable from the segment manifest,
    /// sort, and persist the transcript.
    pub async fn aggregate(
        &self,
        bucket: &str,
        segment_files_key: &str,
        audio_key: &str,
    ) -> Result<AggregateOutput, PipelineError> {
        let segment_files: Vec<SegmentFile> =
            get_json(self.store.as_ref(), bucket, segment_files_key).await?;
        info!(
            segment_files_key,
            segments = segment_files.len(),
            "aggregating transcription results"
        );

        let mut results = Vec::with_capacity(segment_files.len());
        for segment_file in &segment_files {
            let result_key = keys::transcribe_result(&segment_file.key);
            match self.load_result(bucket, &result_key).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!("recovering with placeholder: {e}");
                    results.push(TranscribeResult {
                        speaker: segment_file.speaker.clone(),
                        start: segment_file.start,
                        end: segment_file.end,
                        text: READ_ERROR_TEXT.to_string(),
                    });
                }
            }
        }

        results.sort_by(|a, b| {
            a.start
                .total_cmp(&b.start)
                .then(a.end.total_cmp(&b.end))
                .then(a.speaker.cmp(&b.speaker))
        });

        let transcript_key = keys::final_transcript(keys::base_name(audio_key));
        let body = serde_json::to_vec_pretty(&results)
            .map_err(|e| PipelineError::corrupt(format!("serializing transcript: {e}")))?;
        self.store
            .put(bucket, &transcript_key, body, "application/json")
            .await?;

        info!(
            %transcript_key,
            segment_count = results.len(),
            "final transcript persisted"
        );
        Ok(AggregateOutput {
            transcript_key,
            segment_count: results.len(),
        })
    }

    async fn load_result(
        &self,
        bucket: &str,
        result_key: &str,
    ) -> Result<TranscribeResult, PipelineError> {
        get_json(self.store.as_ref(), bucket, result_key)
            .await
            .map_err(|e| PipelineError::ItemRead {
                key: result_key.to_string(),
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{put_json, MemoryBlobStore};

    fn segment_file(index: usize, speaker: &str, start: f64, end: f64) -> SegmentFile {
        SegmentFile {
            key: format!("segments/rec_{index:04}_{speaker}.wav"),
            speaker: speaker.to_string(),
            start,
            end,
        }
    }

    async fn seed(
        store: &MemoryBlobStore,
        files: &[SegmentFile],
        skip_result_for: Option<usize>,
    ) {
        put_json(store, "bucket", "metadata/rec_segment_files.json", &files)
            .await
            .unwrap();
        for (i, file) in files.iter().enumerate() {
            if skip_result_for == Some(i) {
                continue;
            }
            let result = TranscribeResult {
                speaker: file.speaker.clone(),
                start: file.start,
                end: file.end,
                text: format!("text {i}"),
            };
            put_json(store, "bucket", &keys::transcribe_result(&file.key), &result)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn sorts_results_by_start_time() {
        let store = Arc::new(MemoryBlobStore::new());
        let files = vec![
            segment_file(0, "SPEAKER_B", 7.0, 9.0),
            segment_file(1, "SPEAKER_A", 0.0, 4.0),
            segment_file(2, "SPEAKER_A", 4.5, 6.5),
        ];
        seed(&store, &files, None).await;

        let aggregator = ResultAggregator::new(store.clone());
        let output = aggregator
            .aggregate("bucket", "metadata/rec_segment_files.json", "processed/rec.wav")
            .await
            .unwrap();

        assert_eq!(output.transcript_key, "transcripts/rec_transcript.json");
        assert_eq!(output.segment_count, 3);

        let transcript: Vec<TranscribeResult> =
            get_json(store.as_ref(), "bucket", &output.transcript_key)
                .await
                .unwrap();
        let starts: Vec<f64> = transcript.iter().map(|r| r.start).collect();
        assert_eq!(starts, vec![0.0, 4.5, 7.0]);
    }

    #[tokio::test]
    async fn missing_result_blob_becomes_a_placeholder() {
        let store = Arc::new(MemoryBlobStore::new());
        let files: Vec<SegmentFile> = (0..10)
            .map(|i| segment_file(i, "SPEAKER_A", i as f64 * 2.0, i as f64 * 2.0 + 1.5))
            .collect();
        seed(&store, &files, Some(4)).await;

        let aggregator = ResultAggregator::new(store.clone());
        let output = aggregator
            .aggregate("bucket", "metadata/rec_segment_files.json", "processed/rec.wav")
            .await
            .unwrap();
        assert_eq!(output.segment_count, 10);

        let transcript: Vec<TranscribeResult> =
            get_json(store.as_ref(), "bucket", &output.transcript_key)
                .await
                .unwrap();
        assert_eq!(transcript.len(), 10);

        let placeholders: Vec<&TranscribeResult> = transcript
            .iter()
            .filter(|r| r.text == READ_ERROR_TEXT)
            .collect();
        assert_eq!(placeholders.len(), 1);
        assert_eq!(placeholders[0].start, 8.0);
        assert_eq!(placeholders[0].speaker, "SPEAKER_A");

        assert!(transcript.windows(2).all(|w| w[0].start <= w[1].start));
    }

    #[tokio::test]
    async fn missing_manifest_is_fatal() {
        let store = Arc::new(MemoryBlobStore::new());
        let aggregator = ResultAggregator::new(store);
        let err = aggregator
            .aggregate("bucket", "metadata/rec_segment_files.json", "processed/rec.wav")
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
