//! Part validation gate.

use uplink_core::{PartDescriptor, UploadLimits, ValidationError};

/// Decide whether a file part may be ingested, before any body byte is read.
///
/// Pure function of its inputs, no I/O. Checks, in order: the session's
/// file-part budget, then the declared MIME type against the allow patterns.
/// The caller records the verdict into a part result; a rejected part's
/// sub-stream is drained and discarded by the demuxer, never written.
pub fn validate(descriptor: &PartDescriptor, limits: &UploadLimits) -> Result<(), ValidationError> {
    if descriptor.sequence_index >= limits.max_file_count {
        return Err(ValidationError::TooManyFiles {
            index: descriptor.sequence_index + 1,
            max: limits.max_file_count,
        });
    }

    if !limits.allows_mime(&descriptor.declared_mime) {
        return Err(ValidationError::DisallowedContentType {
            content_type: descriptor.declared_mime.clone(),
        });
    }

    Ok(())
}
