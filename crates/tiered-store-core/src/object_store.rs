//! The object-store driver contract the core consumes. The production driver
//! (S3/GCS/Azure) is out of scope; [`FsObjectStore`] is a local-filesystem
//! stand-in used by tests and the demo CLI so the rest of the pipeline is
//! exercisable end to end.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::BackendError;

/// Inclusive byte range for a ranged fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRange {
    pub from: u64,
    pub to: u64,
}

/// The driver contract a production object-store backend implements.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, key: &str, body: Vec<u8>) -> Result<(), BackendError>;

    async fn fetch(&self, key: &str) -> Result<Vec<u8>, BackendError>;

    async fn fetch_range(&self, key: &str, range: FetchRange) -> Result<Vec<u8>, BackendError>;

    async fn delete(&self, key: &str) -> Result<(), BackendError>;
}

/// A local-filesystem-backed [`ObjectStore`]. Not a production driver: no
/// multipart upload, no retry/backoff, no real access control. Keys map
/// directly to paths under `root`, with intermediate directories created on
/// demand before an atomic write-then-rename.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn to_transient(key: &str, e: io::Error) -> BackendError {
        match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => BackendError::Permanent {
                key: key.to_string(),
                source: e,
            },
            _ => BackendError::Transient {
                key: key.to_string(),
                source: e,
            },
        }
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    #[tracing::instrument(level = "debug", skip(self, body), fields(key, size = body.len()))]
    async fn upload(&self, key: &str, body: Vec<u8>) -> Result<(), BackendError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::to_transient(key, e))?;
        }

        // Write-then-rename keeps a concurrent reader from ever observing a
        // partially written object.
        let tmp = path.with_extension("tmp-upload");
        tokio::fs::write(&tmp, &body)
            .await
            .map_err(|e| Self::to_transient(key, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Self::to_transient(key, e))?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self), fields(key))]
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, BackendError> {
        tokio::fs::read(self.path_for(key))
            .await
            .map_err(|e| Self::to_transient(key, e))
    }

    #[tracing::instrument(level = "debug", skip(self), fields(key, from = range.from, to = range.to))]
    async fn fetch_range(&self, key: &str, range: FetchRange) -> Result<Vec<u8>, BackendError> {
        use tokio::io::AsyncSeekExt;

        let mut file = tokio::fs::File::open(self.path_for(key))
            .await
            .map_err(|e| Self::to_transient(key, e))?;
        file.seek(io::SeekFrom::Start(range.from))
            .await
            .map_err(|e| Self::to_transient(key, e))?;

        let len = (range.to - range.from + 1) as usize;
        let mut buf = vec![0u8; len];
        read_exact_or_transient(&mut file, &mut buf, key).await?;
        Ok(buf)
    }

    #[tracing::instrument(level = "debug", skip(self), fields(key))]
    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::to_transient(key, e)),
        }
    }
}

async fn read_exact_or_transient<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
    key: &str,
) -> Result<(), BackendError> {
    reader
        .read_exact(buf)
        .await
        .map_err(|e| FsObjectStore::to_transient(key, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_then_fetch_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        store.upload("a/b.log", b"hello world".to_vec()).await.unwrap();
        let bytes = store.fetch("a/b.log").await.unwrap();
        assert_eq!(bytes, b"hello world");
    }

    #[tokio::test]
    async fn fetch_range_returns_requested_slice() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        store.upload("x.log", b"0123456789".to_vec()).await.unwrap();
        let bytes = store.fetch_range("x.log", FetchRange { from: 2, to: 5 }).await.unwrap();
        assert_eq!(bytes, b"2345");
    }

    #[tokio::test]
    async fn fetch_missing_key_is_permanent_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        let err = store.fetch("missing").await.unwrap_err();
        assert!(matches!(err, BackendError::Permanent { .. }));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        store.upload("x.log", b"data".to_vec()).await.unwrap();
        store.delete("x.log").await.unwrap();
        store.delete("x.log").await.unwrap();
    }
}
