//! Local filesystem storage backend.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use rand::RngCore;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::traits::{BlobSink, BlobStore, StorageError, StorageResult};
use uplink_core::sanitize::file_extension;

/// Filesystem-backed [`BlobStore`] rooted at a single upload directory.
///
/// The directory is shared across concurrent sessions; generated filenames
/// carry a millisecond timestamp plus a random hex suffix, so no locking is
/// needed between sessions.
#[derive(Clone)]
pub struct LocalStore {
    base_path: PathBuf,
}

impl LocalStore {
    /// Create the store, creating the upload directory if needed.
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::Config(format!(
                "Failed to create upload directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        let base_path = base_path.canonicalize().map_err(|e| {
            StorageError::Config(format!("Failed to canonicalize upload directory: {}", e))
        })?;

        Ok(LocalStore { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a flat filename to a path under the upload directory,
    /// rejecting separators and traversal sequences.
    fn filename_to_path(&self, filename: &str) -> StorageResult<PathBuf> {
        if filename.is_empty()
            || filename.contains("..")
            || filename.contains('/')
            || filename.contains('\\')
        {
            return Err(StorageError::InvalidFilename(filename.to_string()));
        }
        Ok(self.base_path.join(filename))
    }

    /// A path is deletable only if it sits directly under the upload
    /// directory. Rollback lists are built from generated paths, but the
    /// check keeps a corrupted list from reaching outside the store.
    fn check_owned(&self, path: &Path) -> StorageResult<()> {
        if path.parent() == Some(self.base_path.as_path()) {
            Ok(())
        } else {
            Err(StorageError::DeleteFailed(format!(
                "path {} is outside the upload directory",
                path.display()
            )))
        }
    }
}

#[async_trait]
impl BlobStore for LocalStore {
    fn generate_filename(&self, original_filename: &str) -> String {
        let mut suffix = [0u8; 6];
        rand::rng().fill_bytes(&mut suffix);
        format!(
            "upload-{}-{}{}",
            chrono::Utc::now().timestamp_millis(),
            hex::encode(suffix),
            file_extension(original_filename)
        )
    }

    async fn create_sink(&self, filename: &str) -> StorageResult<Box<dyn BlobSink>> {
        let path = self.filename_to_path(filename)?;
        let file = fs::File::create(&path)
            .await
            .map_err(|e| StorageError::WriteFailed(format!("{}: {}", path.display(), e)))?;
        Ok(Box::new(LocalSink {
            file,
            path,
            written: 0,
        }))
    }

    async fn delete(&self, path: &Path) -> StorageResult<()> {
        self.check_owned(path)?;
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Delete skipped, file already gone");
                Ok(())
            }
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "{}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn exists(&self, path: &Path) -> StorageResult<bool> {
        Ok(fs::try_exists(path).await?)
    }

    async fn len(&self, path: &Path) -> StorageResult<u64> {
        match fs::metadata(path).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

struct LocalSink {
    file: fs::File,
    path: PathBuf,
    written: u64,
}

#[async_trait]
impl BlobSink for LocalSink {
    fn path(&self) -> &Path {
        &self.path
    }

    async fn write_chunk(&mut self, chunk: Bytes) -> StorageResult<()> {
        self.file
            .write_all(&chunk)
            .await
            .map_err(|e| StorageError::WriteFailed(format!("{}: {}", self.path.display(), e)))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> StorageResult<u64> {
        self.file
            .flush()
            .await
            .map_err(|e| StorageError::WriteFailed(format!("{}: {}", self.path.display(), e)))?;
        self.file
            .sync_all()
            .await
            .map_err(|e| StorageError::WriteFailed(format!("{}: {}", self.path.display(), e)))?;
        Ok(self.written)
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        drop(self.file);
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "{}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}
