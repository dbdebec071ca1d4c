//! ML model seams
//!
//! The diarization, embedding and speech-to-text models are opaque,
//! externally provided functions. Each costs hundreds of megabytes and
//! seconds to initialize, so a process installs one `ModelSet` and shares it;
//! implementations must either be reentrant-safe or serialize internally.

use crate::error::PipelineError;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// One speaker turn as produced by the diarization model, in seconds
/// relative to the analyzed audio.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakerTurn {
    pub start: f64,
    pub end: f64,
    pub speaker: String,
}

/// Speaker diarization over a waveform.
#[async_trait]
pub trait DiarizationModel: Send + Sync {
    async fn diarize(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<Vec<SpeakerTurn>, PipelineError>;
}

/// Fixed-dimension voice embedding over a sub-interval of a waveform.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Embedding dimensionality D.
    fn dimension(&self) -> usize;

    /// Embed `[start, end)` seconds of the waveform.
    async fn embed_span(
        &self,
        samples: &[f32],
        sample_rate: u32,
        start: f64,
        end: f64,
    ) -> Result<Vec<f32>, PipelineError>;
}

/// Options forwarded to the speech-to-text model.
#[derive(Debug, Clone)]
pub struct SttOptions {
    pub language: String,
    pub beam_size: usize,
}

/// One recognized span of text.
#[derive(Debug, Clone, PartialEq)]
pub struct SttSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Speech-to-text over an audio file.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(
        &self,
        audio_path: &Path,
        options: &SttOptions,
    ) -> Result<Vec<SttSegment>, PipelineError>;
}

/// The three model handles the pipeline needs.
#[derive(Clone)]
pub struct ModelSet {
    pub diarization: Arc<dyn DiarizationModel>,
    pub embedding: Arc<dyn EmbeddingModel>,
    pub stt: Arc<dyn SpeechToText>,
}

impl ModelSet {
    pub fn new(
        diarization: Arc<dyn DiarizationModel>,
        embedding: Arc<dyn EmbeddingModel>,
        stt: Arc<dyn SpeechToText>,
    ) -> Self {
        Self {
            diarization,
            embedding,
            stt,
        }
    }
}

/// Process-wide model registry.
static MODELS: OnceCell<ModelSet> = OnceCell::const_new();

/// Install the process-wide model set. Fails if one is already installed.
pub fn install(models: ModelSet) -> Result<(), PipelineError> {
    MODELS
        .set(models)
        .map_err(|_| PipelineError::model("model set already installed"))
}

/// The process-wide model set, if installed.
pub fn shared() -> Option<ModelSet> {
    MODELS.get().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullDiarization;

    #[async_trait]
    impl DiarizationModel for NullDiarization {
        async fn diarize(
            &self,
            _samples: &[f32],
            _sample_rate: u32,
        ) -> Result<Vec<SpeakerTurn>, PipelineError> {
            Ok(vec![])
        }
    }

    struct NullEmbedding;

    #[async_trait]
    impl EmbeddingModel for NullEmbedding {
        fn dimension(&self) -> usize {
            8
        }

        async fn embed_span(
            &self,
            _samples: &[f32],
            _sample_rate: u32,
            _start: f64,
            _end: f64,
        ) -> Result<Vec<f32>, PipelineError> {
            Ok(vec![0.0; 8])
        }
    }

    struct NullStt;

    #[async_trait]
    impl SpeechToText for NullStt {
        async fn transcribe(
            &self,
            _audio_path: &Path,
            _options: &SttOptions,
        ) -> Result<Vec<SttSegment>, PipelineError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn install_is_once_per_process() {
        let set = ModelSet::new(
            Arc::new(NullDiarization),
            Arc::new(NullEmbedding),
            Arc::new(NullStt),
        );
        install(set.clone()).unwrap();
        assert!(shared().is_some());
        assert!(install(set).is_err());
    }
}
