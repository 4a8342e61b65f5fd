//! OpenDAL-backed chunk stores (local filesystem and GCS).

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use opendal::layers::{LoggingLayer, RetryLayer};
use opendal::{Builder, Operator};
use tracing::debug;

use coffer_core::{CofferError, CofferResult};

use crate::ChunkStore;

#[derive(Debug)]
pub struct OpendalStore {
    op: Operator,
    /// Skip `save` for keys that already exist. Safe because keys are
    /// content-addressed; spends a stat to avoid a re-upload.
    skip_existing: bool,
}

impl OpendalStore {
    /// Chunk directory on the local filesystem, created if missing.
    pub fn local(dir: &Path) -> CofferResult<Self> {
        std::fs::create_dir_all(dir)?;
        let builder = opendal::services::Fs::default().root(&dir.to_string_lossy());
        Ok(OpendalStore {
            op: build_operator(builder)?,
            skip_existing: false,
        })
    }

    /// GCS bucket addressed with a service-account JSON key file.
    pub fn gcs(credential_path: &str, bucket: &str) -> CofferResult<Self> {
        let builder = opendal::services::Gcs::default()
            .bucket(bucket)
            .credential_path(credential_path);
        Ok(OpendalStore {
            op: build_operator(builder)?,
            // A network stat is cheaper than re-uploading a chunk.
            skip_existing: true,
        })
    }

    /// Wrap an already-built operator (tests, exotic backends).
    pub fn from_operator(op: Operator, skip_existing: bool) -> Self {
        OpendalStore { op, skip_existing }
    }
}

fn build_operator(builder: impl Builder) -> CofferResult<Operator> {
    let op = Operator::new(builder)
        .context("creating chunk store operator")?
        .layer(LoggingLayer::default())
        .layer(RetryLayer::new().with_max_times(5).with_jitter())
        .finish();
    Ok(op)
}

fn map_read_err(key: &str, e: opendal::Error) -> CofferError {
    if e.kind() == opendal::ErrorKind::NotFound {
        CofferError::NotFound(format!("chunk {key}"))
    } else {
        CofferError::Io(e.into())
    }
}

#[async_trait]
impl ChunkStore for OpendalStore {
    async fn read(&self, key: &str) -> CofferResult<Vec<u8>> {
        let buf = self.op.read(key).await.map_err(|e| map_read_err(key, e))?;
        Ok(buf.to_bytes().to_vec())
    }

    async fn save(&self, key: &str, contents: Vec<u8>) -> CofferResult<()> {
        if self.skip_existing && self.op.exists(key).await.unwrap_or(false) {
            debug!(key, "chunk already stored; skipping save");
            return Ok(());
        }
        self.op
            .write(key, contents)
            .await
            .map_err(|e| CofferError::Io(e.into()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_save_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = OpendalStore::local(dir.path()).unwrap();

        store.save("aa".repeat(32).as_str(), b"ciphertext".to_vec()).await.unwrap();
        let read = store.read(&"aa".repeat(32)).await.unwrap();
        assert_eq!(read, b"ciphertext");
    }

    #[tokio::test]
    async fn local_missing_key_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = OpendalStore::local(dir.path()).unwrap();

        let err = store.read("meta").await.unwrap_err();
        assert!(err.is_not_found(), "got {err}");
    }

    #[tokio::test]
    async fn local_save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = OpendalStore::local(dir.path()).unwrap();

        store.save("meta", b"one".to_vec()).await.unwrap();
        store.save("meta", b"two".to_vec()).await.unwrap();
        assert_eq!(store.read("meta").await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn local_creates_chunk_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/chunks");
        OpendalStore::local(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
