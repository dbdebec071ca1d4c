//! Pipeline error types
//!
//! One typed error shared by every stage handler. The driver decides retry
//! vs. abort based on `is_retryable()`.

use thiserror::Error;

/// Errors surfaced by stage handlers to the pipeline driver.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Blob store I/O failure that may succeed on retry.
    #[error("blob store operation failed on {key}: {message}")]
    TransientBlobIo { key: String, message: String },

    /// Model inference failure that may succeed on retry.
    #[error("model inference failed: {message}")]
    TransientModel { message: String },

    /// Input audio or blob content that can never be processed.
    #[error("corrupt input: {message}")]
    CorruptInput { message: String },

    /// The clustering stage produced an internally inconsistent result.
    #[error("clustering invariant violated: {message}")]
    ClusteringInvariant { message: String },

    /// A single item's blob could not be read. Recovered locally only in the
    /// aggregator; everywhere else escalated as-is.
    #[error("failed to read {key}: {message}")]
    ItemRead { key: String, message: String },

    /// A stage handler ran past its wall-clock deadline.
    #[error("{stage} exceeded deadline of {seconds}s")]
    DeadlineExceeded { stage: &'static str, seconds: u64 },

    /// All retries for an item were exhausted.
    #[error("{stage} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        stage: &'static str,
        attempts: u32,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    pub fn blob_io(key: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::TransientBlobIo {
            key: key.into(),
            message: message.to_string(),
        }
    }

    pub fn model(message: impl std::fmt::Display) -> Self {
        Self::TransientModel {
            message: message.to_string(),
        }
    }

    pub fn corrupt(message: impl std::fmt::Display) -> Self {
        Self::CorruptInput {
            message: message.to_string(),
        }
    }

    /// Whether the driver may re-invoke the failed item handler.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientBlobIo { .. }
                | Self::TransientModel { .. }
                | Self::DeadlineExceeded { .. }
        )
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
