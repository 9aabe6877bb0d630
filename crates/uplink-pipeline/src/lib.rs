//! Streaming multipart ingestion pipeline.
//!
//! [`UploadPipeline::ingest`] consumes a `multipart/form-data` byte stream
//! and drives one upload session through it: parts are demuxed in wire
//! order, validated before their body is read, streamed to a
//! [`uplink_storage::BlobStore`] in bounded chunks, and large videos are
//! compressed out-of-band while later parts keep flowing. Any fatal error
//! rolls back every byte the session has written.

pub mod demux;
pub mod failure;
pub mod ffmpeg;
pub mod postprocess;
pub mod resource;
pub mod session;
pub mod validator;
pub mod writer;

pub use demux::{FileBody, MultipartDemuxer, RawPart};
pub use failure::FailureTracker;
pub use ffmpeg::FfmpegCompressor;
pub use postprocess::{
    compressed_output_path, PostProcessingCoordinator, SharedPart, VideoCompressor,
};
pub use resource::{NoopResourceManager, ResourceManager};
pub use session::{UploadPipeline, UploadSession};

/// Extract the boundary parameter from a `Content-Type` header value.
pub fn parse_boundary(content_type: &str) -> Option<String> {
    multer::parse_boundary(content_type).ok()
}
