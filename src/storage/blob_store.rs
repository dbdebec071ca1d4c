//! Blob store adapter
//!
//! The only persistence primitive the pipeline uses. Stages communicate
//! exclusively through blobs at deterministic keys; `put` is atomic by key so
//! a reader never observes a partial write.

use crate::error::PipelineError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Opaque byte blobs keyed by `(bucket, key)`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, PipelineError>;

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), PipelineError>;

    async fn download(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<(), PipelineError>;

    async fn upload(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<(), PipelineError>;
}

/// Fetch and deserialize a JSON blob.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn BlobStore,
    bucket: &str,
    key: &str,
) -> Result<T, PipelineError> {
    let bytes = store.get(bucket, key).await?;
    serde_json::from_slice(&bytes).map_err(|e| {
        PipelineError::corrupt(format!("invalid JSON at {bucket}/{key}: {e}"))
    })
}

/// Serialize and store a value as a JSON blob.
pub async fn put_json<T: Serialize>(
    store: &dyn BlobStore,
    bucket: &str,
    key: &str,
    value: &T,
) -> Result<(), PipelineError> {
    let body = serde_json::to_vec(value)
        .map_err(|e| PipelineError::corrupt(format!("serializing {key}: {e}")))?;
    store.put(bucket, key, body, "application/json").await
}

/// Filesystem-backed blob store. Buckets are directories under a root;
/// writes go to a scratch name first and are renamed into place so `put`
/// stays atomic by key.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(bucket).join(key)
    }

    async fn write_atomic(&self, path: &Path, body: &[u8]) -> std::io::Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| std::io::Error::other("object path has no parent"))?;
        tokio::fs::create_dir_all(parent).await?;

        let tmp = parent.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(body).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, path).await
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, PipelineError> {
        let path = self.object_path(bucket, key);
        tokio::fs::read(&path)
            .await
            .map_err(|e| PipelineError::blob_io(format!("{bucket}/{key}"), e))
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), PipelineError> {
        let path = self.object_path(bucket, key);
        debug!(bucket, key, content_type, bytes = body.len(), "put blob");
        self.write_atomic(&path, &body)
            .await
            .map_err(|e| PipelineError::blob_io(format!("{bucket}/{key}"), e))
    }

    async fn download(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<(), PipelineError> {
        let body = self.get(bucket, key).await?;
        tokio::fs::write(local_path, body)
            .await
            .map_err(|e| PipelineError::blob_io(format!("{bucket}/{key}"), e))
    }

    async fn upload(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<(), PipelineError> {
        let body = tokio::fs::read(local_path)
            .await
            .map_err(|e| PipelineError::blob_io(format!("{bucket}/{key}"), e))?;
        self.put(bucket, key, body, content_type).await
    }
}

/// In-memory blob store for tests and single-process runs.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove an object, returning whether it existed.
    pub async fn delete(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .lock()
            .await
            .remove(&(bucket.to_string(), key.to_string()))
            .is_some()
    }

    pub async fn contains(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .lock()
            .await
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    pub async fn keys(&self, bucket: &str) -> Vec<String> {
        let objects = self.objects.lock().await;
        let mut keys: Vec<String> = objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, PipelineError> {
        self.objects
            .lock()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| PipelineError::blob_io(format!("{bucket}/{key}"), "no such object"))
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), PipelineError> {
        self.objects
            .lock()
            .await
            .insert((bucket.to_string(), key.to_string()), body);
        Ok(())
    }

    async fn download(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<(), PipelineError> {
        let body = self.get(bucket, key).await?;
        tokio::fs::write(local_path, body)
            .await
            .map_err(|e| PipelineError::blob_io(format!("{bucket}/{key}"), e))
    }

    async fn upload(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<(), PipelineError> {
        let body = tokio::fs::read(local_path)
            .await
            .map_err(|e| PipelineError::blob_io(format!("{bucket}/{key}"), e))?;
        self.put(bucket, key, body, content_type).await
    }
}
