//! Streaming writer: pump a part's sub-stream into a storage sink.

use uplink_core::{UploadError, UploadLimits};
use uplink_storage::BlobSink;

use crate::demux::FileBody;
use crate::resource::ResourceManager;

/// Pump `body` into `sink` in chunks of at most `buffer_size_bytes`.
///
/// The pump is pull-based: the next chunk is requested only after the sink
/// has accepted the previous one, so a slow sink suspends the source stream
/// and memory stays bounded no matter how large the part is. The running
/// total is checked against `max_file_size_bytes` after every write; on a
/// breach the pump stops immediately and the caller must abort the sink.
///
/// Returns the bytes written on a fully drained sub-stream. The partial file
/// is the caller's to clean up on any error.
pub async fn stream_to_sink(
    body: &mut FileBody,
    sink: &mut dyn BlobSink,
    limits: &UploadLimits,
    resources: &dyn ResourceManager,
) -> Result<u64, UploadError> {
    let buffer_size = limits.buffer_size_bytes.max(1);
    let progress_stride = buffer_size as u64;

    let mut bytes_written: u64 = 0;
    let mut next_progress = progress_stride;

    while let Some(chunk) = body.chunk().await? {
        let mut rest = chunk;
        while !rest.is_empty() {
            let take = rest.len().min(buffer_size);
            let piece = rest.split_to(take);
            sink.write_chunk(piece)
                .await
                .map_err(|e| UploadError::Stream(e.to_string()))?;
            bytes_written += take as u64;

            if bytes_written > limits.max_file_size_bytes {
                return Err(UploadError::LimitExceeded {
                    written: bytes_written,
                    max: limits.max_file_size_bytes,
                });
            }

            if bytes_written >= next_progress {
                tracing::debug!(
                    path = %sink.path().display(),
                    bytes_written,
                    "Upload progress"
                );
                while next_progress <= bytes_written {
                    next_progress += progress_stride;
                }
            }
        }
    }

    if bytes_written >= limits.compression_threshold_bytes {
        resources.request_reclaim();
    }

    Ok(bytes_written)
}
