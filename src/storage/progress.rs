//! Run progress reporting
//!
//! Writes `(run_id, step, progress, updated_at)` rows to an external
//! key/value table. Updates are idempotent and best-effort: a failed write is
//! logged and never fails the pipeline.

use crate::error::PipelineError;
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::task;
use tracing::{info, warn};

/// Pipeline steps in execution order, with their canonical progress values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStep {
    Queued,
    ExtractingAudio,
    ChunkingAudio,
    Diarizing,
    MergingSpeakers,
    SplittingBySpeaker,
    Transcribing,
    AggregatingResults,
    Analyzing,
    Completed,
}

impl PipelineStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::ExtractingAudio => "extracting_audio",
            Self::ChunkingAudio => "chunking_audio",
            Self::Diarizing => "diarizing",
            Self::MergingSpeakers => "merging_speakers",
            Self::SplittingBySpeaker => "splitting_by_speaker",
            Self::Transcribing => "transcribing",
            Self::AggregatingResults => "aggregating_results",
            Self::Analyzing => "analyzing",
            Self::Completed => "completed",
        }
    }

    /// Canonical progress percentage for this step.
    pub fn progress(&self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::ExtractingAudio => 10,
            Self::ChunkingAudio => 15,
            Self::Diarizing => 30,
            Self::MergingSpeakers => 45,
            Self::SplittingBySpeaker => 50,
            Self::Transcribing => 70,
            Self::AggregatingResults => 85,
            Self::Analyzing => 95,
            Self::Completed => 100,
        }
    }
}

/// One progress row as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressRow {
    pub run_id: String,
    pub step: String,
    pub progress: u8,
    pub updated_at: String,
}

/// Destination for progress rows.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn update(&self, run_id: &str, step: PipelineStep) -> Result<(), PipelineError>;

    async fn get(&self, run_id: &str) -> Result<Option<ProgressRow>, PipelineError>;
}

/// Best-effort progress update: failures are logged, never propagated.
pub async fn report(store: &dyn ProgressStore, run_id: &str, step: PipelineStep) {
    match store.update(run_id, step).await {
        Ok(()) => info!(
            run_id,
            step = step.as_str(),
            progress = step.progress(),
            "progress updated"
        ),
        Err(e) => warn!(run_id, step = step.as_str(), "progress update failed: {e}"),
    }
}

/// SQLite-backed progress table.
pub struct SqliteProgressStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteProgressStore {
    pub async fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, PipelineError> {
        let path = db_path.as_ref().to_path_buf();

        let connection = task::spawn_blocking(move || -> anyhow::Result<Connection> {
            let conn = Connection::open(&path).context("failed to open progress database")?;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS run_progress (
                     run_id TEXT PRIMARY KEY,
                     step TEXT NOT NULL,
                     progress INTEGER NOT NULL,
                     updated_at TEXT NOT NULL
                 );",
            )
            .context("failed to create run_progress table")?;
            Ok(conn)
        })
        .await
        .map_err(|e| PipelineError::blob_io("progress.db", e))?
        .map_err(|e| PipelineError::blob_io("progress.db", e))?;

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }
}

#[async_trait]
impl ProgressStore for SqliteProgressStore {
    async fn update(&self, run_id: &str, step: PipelineStep) -> Result<(), PipelineError> {
        let connection = Arc::clone(&self.connection);
        let run_id = run_id.to_string();
        let updated_at = Utc::now().to_rfc3339();

        task::spawn_blocking(move || -> anyhow::Result<()> {
            let conn = connection.lock().unwrap();
            conn.execute(
                "INSERT INTO run_progress (run_id, step, progress, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(run_id) DO UPDATE SET
                     step = excluded.step,
                     progress = excluded.progress,
                     updated_at = excluded.updated_at;",
                rusqlite::params![run_id, step.as_str(), step.progress(), updated_at],
            )
            .context("failed to upsert progress row")?;
            Ok(())
        })
        .await
        .map_err(|e| PipelineError::blob_io("run_progress", e))?
        .map_err(|e| PipelineError::blob_io("run_progress", e))
    }

    async fn get(&self, run_id: &str) -> Result<Option<ProgressRow>, PipelineError> {
        let connection = Arc::clone(&self.connection);
        let run_id = run_id.to_string();

        task::spawn_blocking(move || -> anyhow::Result<Option<ProgressRow>> {
            let conn = connection.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT run_id, step, progress, updated_at
                 FROM run_progress WHERE run_id = ?1;",
            )?;
            let mut rows = stmt.query([&run_id])?;
            match rows.next()? {
                Some(row) => Ok(Some(ProgressRow {
                    run_id: row.get(0)?,
                    step: row.get(1)?,
                    progress: row.get::<_, i64>(2)? as u8,
                    updated_at: row.get(3)?,
                })),
                None => Ok(None),
            }
        })
        .await
        .map_err(|e| PipelineError::blob_io("run_progress", e))?
        .map_err(|e| PipelineError::blob_io("run_progress", e))
    }
}

/// In-memory progress table for tests.
#[derive(Default)]
pub struct MemoryProgressStore {
    rows: Mutex<HashMap<String, ProgressRow>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn update(&self, run_id: &str, step: PipelineStep) -> Result<(), PipelineError> {
        let row = ProgressRow {
            run_id: run_id.to_string(),
            step: step.as_str().to_string(),
            progress: step.progress(),
            updated_at: Utc::now().to_rfc3339(),
        };
        self.rows.lock().unwrap().insert(run_id.to_string(), row);
        Ok(())
    }

    async fn get(&self, run_id: &str) -> Result<Option<ProgressRow>, PipelineError> {
        Ok(self.rows.lock().unwrap().get(run_id).cloned())
    }
}
