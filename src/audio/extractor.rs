//! Audio extraction
//!
//! Normalizes an arbitrary input container to mono 16 kHz PCM WAV by
//! invoking ffmpeg out of process. Inputs that already probe as normalized
//! WAV are passed through untouched.

use crate::audio::wav;
use crate::error::PipelineError;
use crate::keys;
use crate::storage::BlobStore;
use std::path::Path;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info};

/// Result of the extraction stage.
#[derive(Debug, Clone)]
pub struct ExtractOutput {
    /// Key of the normalized WAV (`processed/<base>.wav`).
    pub audio_key: String,
    pub duration_seconds: f64,
}

/// Normalizes source recordings into the pipeline's WAV format.
pub struct AudioExtractor {
    store: Arc<dyn BlobStore>,
}

impl AudioExtractor {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Download the source recording, normalize it, and upload the WAV.
    pub async fn normalize(
        &self,
        bucket: &str,
        source_key: &str,
        scratch: &Path,
    ) -> Result<ExtractOutput, PipelineError> {
        let base = keys::base_name(source_key);
        let audio_key = keys::normalized_wav(base);

        let extension = source_key.rsplit('.').next().unwrap_or("bin");
        let input_path = scratch.join(format!("source.{extension}"));
        let output_path = scratch.join("normalized.wav");

        info!(bucket, source_key, "normalizing source recording");
        self.store.download(bucket, source_key, &input_path).await?;

        let normalized_path = if already_normalized(&input_path) {
            debug!(source_key, "input already mono 16 kHz WAV, skipping ffmpeg");
            input_path.clone()
        } else {
            run_ffmpeg(&input_path, &output_path).await?;
            output_path.clone()
        };

        let info = wav::probe(&normalized_path)?;
        if info.frame_count == 0 {
            return Err(PipelineError::corrupt(format!(
                "normalized audio for {source_key} has zero duration"
            )));
        }
        if !info.is_normalized() {
            return Err(PipelineError::corrupt(format!(
                "normalization produced unexpected format for {source_key}"
            )));
        }

        self.store
            .upload(&normalized_path, bucket, &audio_key, "audio/wav")
            .await?;

        info!(
            %audio_key,
            duration = info.duration_seconds,
            "normalized audio uploaded"
        );
        Ok(ExtractOutput {
            audio_key,
            duration_seconds: info.duration_seconds,
        })
    }
}

fn already_normalized(path: &Path) -> bool {
    path.extension().map(|e| e == "wav").unwrap_or(false)
        && wav::probe(path).map(|info| info.is_normalized()).unwrap_or(false)
}

/// Arguments for the normalization invocation.
fn ffmpeg_args(input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-i".to_string(),
        input.display().to_string(),
        "-ac".to_string(),
        "1".to_string(),
        "-ar".to_string(),
        "16000".to_string(),
        "-acodec".to_string(),
        "pcm_s16le".to_string(),
        "-f".to_string(),
        "wav".to_string(),
        output.display().to_string(),
    ]
}

async fn run_ffmpeg(input: &Path, output: &Path) -> Result<(), PipelineError> {
    let args = ffmpeg_args(input, output);
    debug!(?args, "running ffmpeg");

    let result = Command::new("ffmpeg")
        .args(&args)
        .output()
        .await
        .map_err(|e| PipelineError::corrupt(format!("failed to launch ffmpeg: {e}")))?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(PipelineError::corrupt(format!(
            "ffmpeg exited with {}: {}",
            result.status,
            stderr.trim()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlobStore;

    #[test]
    fn ffmpeg_args_request_mono_16khz_pcm() {
        let args = ffmpeg_args(Path::new("/tmp/in.mp4"), Path::new("/tmp/out.wav"));
        let joined = args.join(" ");

        assert!(joined.contains("-i /tmp/in.mp4"));
        assert!(joined.contains("-ac 1"));
        assert!(joined.contains("-ar 16000"));
        assert!(joined.contains("-acodec pcm_s16le"));
        assert!(joined.ends_with("/tmp/out.wav"));
    }

    #[tokio::test]
    async fn normalized_wav_input_passes_through_without_ffmpeg() {
        let store = Arc::new(MemoryBlobStore::new());
        let scratch = tempfile::tempdir().unwrap();

        let samples: Vec<i16> = vec![0; wav::SAMPLE_RATE as usize];
        let local = scratch.path().join("seed.wav");
        wav::write_normalized(&local, &samples).unwrap();
        store
            .upload(&local, "bucket", "uploads/rec.wav", "audio/wav")
            .await
            .unwrap();

        let extractor = AudioExtractor::new(store.clone());
        let output = extractor
            .normalize("bucket", "uploads/rec.wav", scratch.path())
            .await
            .unwrap();

        assert_eq!(output.audio_key, "processed/rec.wav");
        assert!((output.duration_seconds - 1.0).abs() < 1e-6);
        assert!(store.contains("bucket", "processed/rec.wav").await);
    }

    #[tokio::test]
    async fn zero_duration_audio_is_rejected() {
        let store = Arc::new(MemoryBlobStore::new());
        let scratch = tempfile::tempdir().unwrap();

        let local = scratch.path().join("empty.wav");
        wav::write_normalized(&local, &[]).unwrap();
        store
            .upload(&local, "bucket", "uploads/empty.wav", "audio/wav")
            .await
            .unwrap();

        let extractor = AudioExtractor::new(store);
        let err = extractor
            .normalize("bucket", "uploads/empty.wav", scratch.path())
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }
}
