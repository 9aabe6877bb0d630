//! Pull-based demuxing of a multipart body into parts.
//!
//! Wire parsing itself is `multer`'s job; this module turns its field
//! iterator into the pipeline's part model: plain fields are read eagerly
//! (under the field limits), file parts are surfaced as an unread
//! [`FileBody`] so validation can run before a single body byte is pulled.

use bytes::Bytes;
use futures::Stream;

use uplink_core::{PartDescriptor, UploadError, UploadLimits, ValidationError};

const DEFAULT_FILENAME: &str = "unknown";
const DEFAULT_MIME: &str = "application/octet-stream";

/// One part of the request, in wire order.
pub enum RawPart {
    /// A file part. The body has not been read yet.
    File {
        descriptor: PartDescriptor,
        body: FileBody,
    },
    /// A plain field, already read and size-checked.
    Field { name: String, value: String },
}

/// The unread byte sub-stream of a single file part.
pub struct FileBody {
    field: multer::Field<'static>,
}

impl FileBody {
    /// Pull the next chunk, or `None` at the end of the part.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, UploadError> {
        self.field.chunk().await.map_err(map_multer_error)
    }

    /// Drain the remaining bytes without persisting anything, so the outer
    /// stream can advance past a rejected part. Returns the discarded size.
    pub async fn discard(mut self) -> Result<u64, UploadError> {
        let mut discarded = 0u64;
        while let Some(chunk) = self.chunk().await? {
            discarded += chunk.len() as u64;
        }
        Ok(discarded)
    }
}

/// Incremental parser over the request stream, yielding parts one at a time.
///
/// Strictly sequential: the previous part's body must be fully consumed (or
/// discarded) before `next_part` can yield the following one. That ordering
/// is what lets one bad part halt the session before later parts buffer up.
pub struct MultipartDemuxer {
    inner: multer::Multipart<'static>,
    limits: UploadLimits,
    file_count: usize,
    field_count: usize,
}

impl MultipartDemuxer {
    pub fn new<S, E>(stream: S, boundary: &str, limits: UploadLimits) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    {
        MultipartDemuxer {
            inner: multer::Multipart::new(stream, boundary),
            limits,
            file_count: 0,
            field_count: 0,
        }
    }

    /// Next part in wire order, or `None` at end-of-stream.
    pub async fn next_part(&mut self) -> Result<Option<RawPart>, UploadError> {
        let Some(field) = self.inner.next_field().await.map_err(map_multer_error)? else {
            return Ok(None);
        };

        if field.file_name().is_some() {
            let descriptor = PartDescriptor {
                field_name: field.name().unwrap_or("file").to_string(),
                declared_filename: field.file_name().unwrap_or(DEFAULT_FILENAME).to_string(),
                declared_mime: field
                    .content_type()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| DEFAULT_MIME.to_string()),
                sequence_index: self.file_count,
            };
            self.file_count += 1;
            return Ok(Some(RawPart::File {
                descriptor,
                body: FileBody { field },
            }));
        }

        self.field_count += 1;
        if self.field_count > self.limits.max_field_count {
            return Err(ValidationError::TooManyFields {
                max: self.limits.max_field_count,
            }
            .into());
        }

        let name = field.name().unwrap_or_default().to_string();
        let value = self.read_field_value(field, &name).await?;
        Ok(Some(RawPart::Field { name, value }))
    }

    async fn read_field_value(
        &self,
        mut field: multer::Field<'static>,
        name: &str,
    ) -> Result<String, UploadError> {
        let mut buf = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(map_multer_error)? {
            if buf.len() + chunk.len() > self.limits.max_field_size_bytes {
                return Err(ValidationError::FieldTooLarge {
                    name: name.to_string(),
                    max: self.limits.max_field_size_bytes,
                }
                .into());
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// A failing body read means the client went away; everything else is a
/// malformed payload.
fn map_multer_error(err: multer::Error) -> UploadError {
    match err {
        multer::Error::StreamReadFailed(_) | multer::Error::IncompleteStream => {
            UploadError::ClientAbort
        }
        other => UploadError::Validation(ValidationError::Malformed(other.to_string())),
    }
}
