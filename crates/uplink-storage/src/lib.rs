//! Durable byte-sink abstraction for the ingestion pipeline.
//!
//! The pipeline only needs a place to pump chunks into, a way to finalize or
//! abort an in-progress write, and deletion for rollback. [`BlobStore`] is
//! that seam; [`LocalStore`] is the filesystem backend.

pub mod local;
pub mod traits;

pub use local::LocalStore;
pub use traits::{BlobSink, BlobStore, StorageError, StorageResult};
