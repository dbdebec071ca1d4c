//! Shared test support: scripted models and recording fixtures.
//!
//! The source WAV is stamped with a constant marker value per window stride,
//! so the scripted models can tell chunks apart from the audio alone, the
//! same way the real models only ever see samples.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use transcribe_pipeline::audio::wav;
use transcribe_pipeline::error::PipelineError;
use transcribe_pipeline::models::{
    DiarizationModel, EmbeddingModel, ModelSet, SpeakerTurn, SpeechToText, SttOptions, SttSegment,
};
use transcribe_pipeline::storage::{PipelineStep, ProgressRow, ProgressStore};

/// What the scripted models should produce for one chunk, keyed by the
/// marker value stamped into that chunk's first sample.
pub struct ChunkScript {
    pub turns: Vec<SpeakerTurn>,
    pub embeddings: HashMap<String, Vec<f32>>,
}

pub fn turn(start: f64, end: f64, speaker: &str) -> SpeakerTurn {
    SpeakerTurn {
        start,
        end,
        speaker: speaker.to_string(),
    }
}

/// Diarization, embedding and STT backed by per-chunk scripts.
pub struct ScriptedModels {
    dimension: usize,
    by_marker: HashMap<i16, ChunkScript>,
}

impl ScriptedModels {
    pub fn new(dimension: usize, by_marker: HashMap<i16, ChunkScript>) -> Self {
        Self {
            dimension,
            by_marker,
        }
    }

    pub fn into_model_set(self) -> ModelSet {
        let shared = Arc::new(self);
        ModelSet::new(shared.clone(), shared.clone(), shared)
    }

    fn script_for(&self, samples: &[f32]) -> Option<&ChunkScript> {
        let marker = (samples.first().copied().unwrap_or(0.0) * i16::MAX as f32).round() as i16;
        self.by_marker.get(&marker)
    }
}

#[async_trait]
impl DiarizationModel for ScriptedModels {
    async fn diarize(
        &self,
        samples: &[f32],
        _sample_rate: u32,
    ) -> Result<Vec<SpeakerTurn>, PipelineError> {
        Ok(self
            .script_for(samples)
            .map(|script| script.turns.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl EmbeddingModel for ScriptedModels {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_span(
        &self,
        samples: &[f32],
        _sample_rate: u32,
        start: f64,
        end: f64,
    ) -> Result<Vec<f32>, PipelineError> {
        let script = self
            .script_for(samples)
            .ok_or_else(|| PipelineError::model("no script for this chunk"))?;
        let matching = script
            .turns
            .iter()
            .find(|t| (t.start - start).abs() < 1e-6 && (t.end - end).abs() < 1e-6)
            .ok_or_else(|| PipelineError::model(format!("no turn covers [{start}, {end})")))?;
        script
            .embeddings
            .get(&matching.speaker)
            .cloned()
            .ok_or_else(|| PipelineError::model(format!("no embedding for {}", matching.speaker)))
    }
}

#[async_trait]
impl SpeechToText for ScriptedModels {
    async fn transcribe(
        &self,
        audio_path: &Path,
        _options: &SttOptions,
    ) -> Result<Vec<SttSegment>, PipelineError> {
        let info = wav::probe(audio_path)?;
        Ok(vec![SttSegment {
            start: 0.0,
            end: info.duration_seconds,
            text: format!("{:.1}s of speech", info.duration_seconds),
        }])
    }
}

/// Progress store that records every update in order.
#[derive(Default)]
pub struct RecordingProgress {
    pub updates: Mutex<Vec<(String, u8)>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> Vec<String> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .map(|(step, _)| step.clone())
            .collect()
    }
}

#[async_trait]
impl ProgressStore for RecordingProgress {
    async fn update(&self, run_id: &str, step: PipelineStep) -> Result<(), PipelineError> {
        let _ = run_id;
        self.updates
            .lock()
            .unwrap()
            .push((step.as_str().to_string(), step.progress()));
        Ok(())
    }

    async fn get(&self, run_id: &str) -> Result<Option<ProgressRow>, PipelineError> {
        Ok(self.updates.lock().unwrap().last().map(|(step, progress)| {
            ProgressRow {
                run_id: run_id.to_string(),
                step: step.clone(),
                progress: *progress,
                updated_at: String::new(),
            }
        }))
    }
}

/// Normalized source samples with one marker value per region. Regions are
/// `(start_seconds, marker)` pairs; each runs until the next region starts.
pub fn marker_samples(total_seconds: f64, regions: &[(f64, i16)]) -> Vec<i16> {
    let frames = (total_seconds * wav::SAMPLE_RATE as f64) as usize;
    let mut samples = vec![0i16; frames];
    for (i, &(start, marker)) in regions.iter().enumerate() {
        let from = (start * wav::SAMPLE_RATE as f64) as usize;
        let to = regions
            .get(i + 1)
            .map(|&(next, _)| (next * wav::SAMPLE_RATE as f64) as usize)
            .unwrap_or(frames);
        samples[from..to.min(frames)].fill(marker);
    }
    samples
}

/// Write samples as a WAV file and return its path.
pub fn write_wav(dir: &Path, name: &str, samples: &[i16]) -> std::path::PathBuf {
    let path = dir.join(name);
    wav::write_normalized(&path, samples).unwrap();
    path
}
