//! Storage abstraction traits.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage filename: {0}")]
    InvalidFilename(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// An in-progress write to durable storage.
///
/// Chunks are accepted one at a time; the sink applies backpressure by not
/// returning from `write_chunk` until the bytes have been handed to the
/// backend. A sink must end with exactly one of `finish` or `abort`; `abort`
/// removes everything written so far.
#[async_trait]
pub trait BlobSink: Send {
    /// Destination path of this sink, fixed at creation.
    fn path(&self) -> &Path;

    async fn write_chunk(&mut self, chunk: Bytes) -> StorageResult<()>;

    /// Flush and make durable; returns the total bytes written.
    async fn finish(self: Box<Self>) -> StorageResult<u64>;

    /// Discard the partial write, deleting anything already on disk.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}

/// Storage backend abstraction.
///
/// Filenames handed to `create_sink` are flat (no directories); backends
/// reject anything containing separators or traversal sequences.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Generate a collision-resistant stored filename for an upload,
    /// preserving the original file extension:
    /// `upload-<unixMillis>-<randomHex><ext>`.
    fn generate_filename(&self, original_filename: &str) -> String;

    /// Open a sink for the given stored filename.
    async fn create_sink(&self, filename: &str) -> StorageResult<Box<dyn BlobSink>>;

    /// Delete a stored file. Deleting a path that no longer exists is not an
    /// error; rollback must be idempotent.
    async fn delete(&self, path: &Path) -> StorageResult<()>;

    async fn exists(&self, path: &Path) -> StorageResult<bool>;

    /// Size in bytes of a stored file.
    async fn len(&self, path: &Path) -> StorageResult<u64>;
}
