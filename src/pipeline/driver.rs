//! Pipeline driver
//!
//! Orders the stages, fans out per-item work with bounded parallelism, and
//! passes only manifests between stages. Every item handler runs under a
//! wall-clock deadline and is retried with exponential backoff while its
//! failure is retryable; the first fatal error aborts the run and leaves all
//! intermediate blobs intact for inspection.

use crate::asr::transcriber::SegmentTranscriber;
use crate::asr::types::TranscribeManifest;
use crate::audio::chunker::{ChunkDescriptor, Chunker};
use crate::audio::extractor::AudioExtractor;
use crate::audio::splitter::{SegmentFile, SpeakerSplitter};
use crate::config::PipelineConfig;
use crate::diarization::diarizer::ChunkDiarizer;
use crate::diarization::merger::SpeakerMerger;
use crate::diarization::types::ChunkManifest;
use crate::error::PipelineError;
use crate::models::ModelSet;
use crate::pipeline::aggregator::ResultAggregator;
use crate::pipeline::messages::{
    AggregateRequest, DiarizeRequest, MergeRequest, SplitManifest, SplitRequest,
    TranscribeRequest,
};
use crate::storage::{report, BlobStore, PipelineStep, ProgressStore};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

/// One pipeline invocation.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub run_id: String,
    pub bucket: String,
    pub source_key: String,
}

impl RunRequest {
    /// Request with a fresh run id.
    pub fn new(bucket: impl Into<String>, source_key: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            bucket: bucket.into(),
            source_key: source_key.into(),
        }
    }
}

/// What a completed run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub audio_key: String,
    pub transcript_key: String,
    pub global_speaker_count: usize,
    pub segment_count: usize,
}

/// Orchestrates extraction → chunking → diarization → merge → split →
/// transcription → aggregation.
pub struct PipelineDriver {
    store: Arc<dyn BlobStore>,
    progress: Arc<dyn ProgressStore>,
    models: ModelSet,
    config: PipelineConfig,
}

impl PipelineDriver {
    pub fn new(
        store: Arc<dyn BlobStore>,
        progress: Arc<dyn ProgressStore>,
        models: ModelSet,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            store,
            progress,
            models,
            config,
        })
    }

    /// Build a driver against the process-wide model registry.
    pub fn from_shared_models(
        store: Arc<dyn BlobStore>,
        progress: Arc<dyn ProgressStore>,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        let models = crate::models::shared()
            .ok_or_else(|| PipelineError::model("no model set installed for this process"))?;
        Self::new(store, progress, models, config)
    }

    /// Run the full pipeline for one recording.
    pub async fn run(&self, request: &RunRequest) -> Result<RunSummary, PipelineError> {
        let result = self.run_inner(request).await;
        if let Err(e) = &result {
            error!(run_id = %request.run_id, "run failed: {e}");
        }
        result
    }

    async fn run_inner(&self, request: &RunRequest) -> Result<RunSummary, PipelineError> {
        let run_id = request.run_id.as_str();
        let bucket = request.bucket.as_str();
        let scratch = tempfile::tempdir()
            .map_err(|e| PipelineError::corrupt(format!("creating scratch dir: {e}")))?;

        info!(run_id, bucket, source_key = %request.source_key, "run started");
        report(self.progress.as_ref(), run_id, PipelineStep::Queued).await;

        report(self.progress.as_ref(), run_id, PipelineStep::ExtractingAudio).await;
        let extractor = AudioExtractor::new(self.store.clone());
        let extracted = self
            .with_retries("extract_audio", || {
                extractor.normalize(bucket, &request.source_key, scratch.path())
            })
            .await?;
        let audio_key = extracted.audio_key.clone();

        report(self.progress.as_ref(), run_id, PipelineStep::ChunkingAudio).await;
        let chunker = Chunker::new(self.store.clone(), self.config.clone());
        let chunks = self
            .with_retries("chunk_audio", || {
                chunker.chunk(bucket, &audio_key, scratch.path())
            })
            .await?;

        report(self.progress.as_ref(), run_id, PipelineStep::Diarizing).await;
        let chunk_results = self.fan_out_diarize(bucket, &chunks, scratch.path()).await?;

        report(self.progress.as_ref(), run_id, PipelineStep::MergingSpeakers).await;
        let merge_request = MergeRequest::build(
            self.store.as_ref(),
            bucket,
            &audio_key,
            chunk_results,
            self.config.payload_cap_bytes,
        )
        .await?;
        let chunk_results = merge_request
            .resolve_chunk_results(self.store.as_ref())
            .await?;
        let merger = SpeakerMerger::new(self.store.clone(), self.config.clone());
        let merged = self
            .with_retries("merge_speakers", || {
                merger.merge(bucket, &audio_key, &chunk_results)
            })
            .await?;

        report(
            self.progress.as_ref(),
            run_id,
            PipelineStep::SplittingBySpeaker,
        )
        .await;
        let split_request = SplitRequest {
            bucket: bucket.to_string(),
            audio_key: audio_key.clone(),
            segments_key: merged.segments_key.clone(),
            global_speaker_count: merged.global_speaker_count,
        };
        let splitter = SpeakerSplitter::new(self.store.clone());
        let split = self
            .with_retries("split_by_speaker", || {
                splitter.split(
                    &split_request.bucket,
                    &split_request.audio_key,
                    &split_request.segments_key,
                    scratch.path(),
                )
            })
            .await?;
        let split_manifest = SplitManifest::from_output(split, self.config.payload_cap_bytes)?;
        let segment_files = split_manifest
            .resolve_segment_files(self.store.as_ref(), bucket)
            .await?;

        report(self.progress.as_ref(), run_id, PipelineStep::Transcribing).await;
        self.fan_out_transcribe(bucket, &segment_files, scratch.path())
            .await?;

        report(
            self.progress.as_ref(),
            run_id,
            PipelineStep::AggregatingResults,
        )
        .await;
        let aggregate_request = AggregateRequest {
            bucket: bucket.to_string(),
            segment_files_key: split_manifest.segment_files_key.clone(),
            audio_key: audio_key.clone(),
        };
        let aggregator = ResultAggregator::new(self.store.clone());
        let aggregated = self
            .with_retries("aggregate_results", || {
                aggregator.aggregate(
                    &aggregate_request.bucket,
                    &aggregate_request.segment_files_key,
                    &aggregate_request.audio_key,
                )
            })
            .await?;

        report(self.progress.as_ref(), run_id, PipelineStep::Completed).await;
        info!(
            run_id,
            transcript_key = %aggregated.transcript_key,
            speakers = merged.global_speaker_count,
            "run completed"
        );

        Ok(RunSummary {
            run_id: run_id.to_string(),
            audio_key,
            transcript_key: aggregated.transcript_key,
            global_speaker_count: merged.global_speaker_count,
            segment_count: aggregated.segment_count,
        })
    }

    /// Diarize every chunk with bounded parallelism. Each chunk operates on
    /// its own keys, so workers share nothing but the store.
    async fn fan_out_diarize(
        &self,
        bucket: &str,
        chunks: &[ChunkDescriptor],
        scratch: &Path,
    ) -> Result<Vec<ChunkManifest>, PipelineError> {
        let semaphore = Arc::new(Semaphore::new(self.config.diarize_workers));
        let mut tasks = JoinSet::new();

        for chunk in chunks.iter().cloned() {
            let request = DiarizeRequest {
                bucket: bucket.to_string(),
                chunk,
            };
            let semaphore = semaphore.clone();
            let store = self.store.clone();
            let models = self.models.clone();
            let config = self.config.clone();
            let scratch = scratch.to_path_buf();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore open");
                let diarizer = ChunkDiarizer::new(store, models, config.clone());
                retry_item(
                    "diarize",
                    config.stage_deadline_secs,
                    config.max_retries,
                    || diarizer.diarize_chunk(&request.bucket, &request.chunk, &scratch),
                )
                .await
            });
        }

        let mut results = Vec::with_capacity(chunks.len());
        while let Some(joined) = tasks.join_next().await {
            let manifest = joined
                .map_err(|e| PipelineError::corrupt(format!("diarize worker crashed: {e}")))??;
            results.push(manifest);
        }
        results.sort_by_key(|m| m.chunk_index);
        Ok(results)
    }

    /// Transcribe every segment clip with bounded parallelism.
    async fn fan_out_transcribe(
        &self,
        bucket: &str,
        segment_files: &[SegmentFile],
        scratch: &Path,
    ) -> Result<Vec<TranscribeManifest>, PipelineError> {
        let semaphore = Arc::new(Semaphore::new(self.config.transcribe_workers));
        let mut tasks = JoinSet::new();

        for segment_file in segment_files.iter().cloned() {
            let request = TranscribeRequest {
                bucket: bucket.to_string(),
                segment_file,
            };
            let semaphore = semaphore.clone();
            let store = self.store.clone();
            let models = self.models.clone();
            let config = self.config.clone();
            let scratch = scratch.to_path_buf();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore open");
                let transcriber = SegmentTranscriber::new(store, models, config.clone());
                retry_item(
                    "transcribe",
                    config.stage_deadline_secs,
                    config.max_retries,
                    || {
                        transcriber.transcribe_segment(
                            &request.bucket,
                            &request.segment_file,
                            &scratch,
                        )
                    },
                )
                .await
            });
        }

        let mut results = Vec::with_capacity(segment_files.len());
        while let Some(joined) = tasks.join_next().await {
            let manifest = joined.map_err(|e| {
                PipelineError::corrupt(format!("transcribe worker crashed: {e}"))
            })??;
            results.push(manifest);
        }
        results.sort_by(|a, b| a.result_key.cmp(&b.result_key));
        Ok(results)
    }

    async fn with_retries<T, F, Fut>(
        &self,
        stage: &'static str,
        operation: F,
    ) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        retry_item(
            stage,
            self.config.stage_deadline_secs,
            self.config.max_retries,
            operation,
        )
        .await
    }
}

/// Run one item handler under a deadline, retrying retryable failures with
/// exponential backoff. `max_retries` bounds re-invocations, so an item is
/// attempted at most `max_retries + 1` times.
pub async fn retry_item<T, F, Fut>(
    stage: &'static str,
    deadline_secs: u64,
    max_retries: u32,
    mut operation: F,
) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    let mut failures = 0u32;
    loop {
        let attempt = tokio::time::timeout(Duration::from_secs(deadline_secs), operation()).await;
        let error = match attempt {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e,
            Err(_) => PipelineError::DeadlineExceeded {
                stage,
                seconds: deadline_secs,
            },
        };

        if !error.is_retryable() {
            return Err(error);
        }
        failures += 1;
        if failures > max_retries {
            return Err(PipelineError::RetriesExhausted {
                stage,
                attempts: failures,
                source: Box::new(error),
            });
        }

        let backoff = Duration::from_millis(250 * (1 << (failures - 1).min(6)));
        warn!(stage, failures, ?backoff, "retrying after failure: {error}");
        tokio::time::sleep(backoff).await;
    }
}
