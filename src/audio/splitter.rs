//! Speaker splitting
//!
//! Cuts the normalized recording into one clip per merged segment. The
//! input is already mono 16 kHz PCM, so clips are sliced by sample range and
//! re-written as WAV. The clip list is persisted as the `segment_files`
//! manifest blob before it is returned.

use crate::audio::wav;
use crate::diarization::types::GlobalSegment;
use crate::error::PipelineError;
use crate::keys;
use crate::storage::{get_json, put_json, BlobStore};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Descriptor of one sliced clip; corresponds 1:1 to a merged segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentFile {
    pub key: String,
    pub speaker: String,
    pub start: f64,
    pub end: f64,
}

/// Result of the split stage.
#[derive(Debug, Clone)]
pub struct SplitOutput {
    pub segment_files: Vec<SegmentFile>,
    pub segment_files_key: String,
}

/// Cuts per-segment clips out of the normalized recording.
pub struct SpeakerSplitter {
    store: Arc<dyn BlobStore>,
}

impl SpeakerSplitter {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Slice every merged segment into its own clip blob.
    pub async fn split(
        &self,
        bucket: &str,
        audio_key: &str,
        segments_key: &str,
        scratch: &Path,
    ) -> Result<SplitOutput, PipelineError> {
        let base = keys::base_name(audio_key);
        let segments: Vec<GlobalSegment> =
            get_json(self.store.as_ref(), bucket, segments_key).await?;

        let local = scratch.join("splitter_input.wav");
        self.store.download(bucket, audio_key, &local).await?;
        let samples = wav::read_samples(&local)?;

        info!(
            audio_key,
            segments = segments.len(),
            "splitting recording by speaker"
        );

        let mut segment_files = Vec::with_capacity(segments.len());
        for (index, segment) in segments.iter().enumerate() {
            let key = keys::segment_clip(base, index, &segment.speaker);
            let span = wav::cut_span(&samples, segment.start, segment.end);

            let clip_path = scratch.join(format!("segment_{index:04}.wav"));
            wav::write_normalized(&clip_path, span)?;
            self.store
                .upload(&clip_path, bucket, &key, "audio/wav")
                .await?;
            debug!(%key, start = segment.start, end = segment.end, "clip uploaded");

            segment_files.push(SegmentFile {
                key,
                speaker: segment.speaker.clone(),
                start: segment.start,
                end: segment.end,
            });
        }

        let segment_files_key = keys::segment_manifest(base);
        put_json(self.store.as_ref(), bucket, &segment_files_key, &segment_files).await?;

        Ok(SplitOutput {
            segment_files,
            segment_files_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlobStore;

    async fn seed_recording(store: &MemoryBlobStore, scratch: &Path, seconds: usize) {
        let local = scratch.join("seed.wav");
        let samples: Vec<i16> = (0..seconds * wav::SAMPLE_RATE as usize)
            .map(|i| (i % 251) as i16)
            .collect();
        wav::write_normalized(&local, &samples).unwrap();
        store
            .upload(&local, "bucket", "processed/rec.wav", "audio/wav")
            .await
            .unwrap();
    }

    fn segment(start: f64, end: f64, speaker: &str) -> GlobalSegment {
        GlobalSegment {
            start,
            end,
            speaker: speaker.to_string(),
        }
    }

    #[tokio::test]
    async fn cuts_one_clip_per_segment() {
        let store = Arc::new(MemoryBlobStore::new());
        let scratch = tempfile::tempdir().unwrap();
        seed_recording(&store, scratch.path(), 10).await;

        let segments = vec![
            segment(0.0, 5.0, "SPEAKER_A"),
            segment(5.5, 10.0, "SPEAKER_B"),
        ];
        put_json(store.as_ref(), "bucket", "rec_segments.json", &segments)
            .await
            .unwrap();

        let splitter = SpeakerSplitter::new(store.clone());
        let output = splitter
            .split("bucket", "processed/rec.wav", "rec_segments.json", scratch.path())
            .await
            .unwrap();

        assert_eq!(output.segment_files.len(), 2);
        assert_eq!(
            output.segment_files[0].key,
            "segments/rec_0000_SPEAKER_A.wav"
        );
        assert_eq!(
            output.segment_files[1].key,
            "segments/rec_0001_SPEAKER_B.wav"
        );
        assert_eq!(output.segment_files[1].speaker, "SPEAKER_B");
        assert_eq!(output.segment_files[1].start, 5.5);
        assert_eq!(output.segment_files[1].end, 10.0);

        // Clip audio really is the requested span.
        let clip_path = scratch.path().join("check.wav");
        store
            .download("bucket", &output.segment_files[0].key, &clip_path)
            .await
            .unwrap();
        let info = wav::probe(&clip_path).unwrap();
        assert!((info.duration_seconds - 5.0).abs() < 1e-3);

        // The manifest blob mirrors the returned list.
        assert_eq!(output.segment_files_key, "metadata/rec_segment_files.json");
        let stored: Vec<SegmentFile> =
            get_json(store.as_ref(), "bucket", &output.segment_files_key)
                .await
                .unwrap();
        assert_eq!(stored, output.segment_files);
    }

    #[tokio::test]
    async fn empty_timeline_yields_empty_manifest() {
        let store = Arc::new(MemoryBlobStore::new());
        let scratch = tempfile::tempdir().unwrap();
        seed_recording(&store, scratch.path(), 2).await;
        put_json(
            store.as_ref(),
            "bucket",
            "rec_segments.json",
            &Vec::<GlobalSegment>::new(),
        )
        .await
        .unwrap();

        let splitter = SpeakerSplitter::new(store.clone());
        let output = splitter
            .split("bucket", "processed/rec.wav", "rec_segments.json", scratch.path())
            .await
            .unwrap();

        assert!(output.segment_files.is_empty());
        assert!(store.contains("bucket", &output.segment_files_key).await);
    }
}
