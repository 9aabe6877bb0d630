//! Error types module
//!
//! All pipeline errors are unified under [`UploadError`]. Validation failures
//! carry their own structured [`ValidationError`] so callers can report what
//! was wrong with a part without string matching.
//!
//! Every variant except `PostProcessing` is session-fatal: the whole session
//! fails and every byte written so far is rolled back. A post-processing
//! failure downgrades the affected part to its uncompressed form and is
//! reported as a warning.

/// Structured rejection reasons produced before any body byte of a part is
/// consumed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("too many file parts: part {index} exceeds the limit of {max}")]
    TooManyFiles { index: usize, max: usize },

    #[error("content type {content_type:?} is not allowed")]
    DisallowedContentType { content_type: String },

    #[error("field {name:?} exceeds the per-field size limit of {max} bytes")]
    FieldTooLarge { name: String, max: usize },

    #[error("too many non-file fields (limit {max})")]
    TooManyFields { max: usize },

    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    #[error("malformed multipart body: {0}")]
    Malformed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("file exceeds the maximum size: wrote {written} bytes, limit is {max}")]
    LimitExceeded { written: u64, max: u64 },

    #[error("upload stream failed: {0}")]
    Stream(String),

    #[error("client disconnected mid-upload")]
    ClientAbort,

    #[error("session timed out after {limit_secs}s")]
    Timeout { limit_secs: u64 },

    #[error("post-processing failed: {0}")]
    PostProcessing(String),
}

impl UploadError {
    /// Whether this error fails the whole session. Post-processing failures
    /// are recovered locally and never fail a session.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, UploadError::PostProcessing(_))
    }

    /// Whether this error represents the client going away rather than a
    /// problem with the upload itself.
    pub fn is_abort(&self) -> bool {
        matches!(self, UploadError::ClientAbort | UploadError::Timeout { .. })
    }

    /// Machine-readable error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            UploadError::Validation(_) => "VALIDATION_ERROR",
            UploadError::LimitExceeded { .. } => "LIMIT_EXCEEDED",
            UploadError::Stream(_) => "STREAM_ERROR",
            UploadError::ClientAbort => "CLIENT_ABORT",
            UploadError::Timeout { .. } => "SESSION_TIMEOUT",
            UploadError::PostProcessing(_) => "POST_PROCESSING_ERROR",
        }
    }

    /// HTTP status code for API responses.
    pub fn http_status_code(&self) -> u16 {
        match self {
            UploadError::Validation(_) => 400,
            UploadError::LimitExceeded { .. } => 413,
            UploadError::Stream(_) => 500,
            UploadError::ClientAbort => 400,
            UploadError::Timeout { .. } => 408,
            UploadError::PostProcessing(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_processing_is_never_fatal() {
        assert!(!UploadError::PostProcessing("ffmpeg exited with 1".into()).is_fatal());
        assert!(UploadError::ClientAbort.is_fatal());
        assert!(UploadError::LimitExceeded { written: 10, max: 5 }.is_fatal());
    }

    #[test]
    fn abort_classification() {
        assert!(UploadError::ClientAbort.is_abort());
        assert!(UploadError::Timeout { limit_secs: 900 }.is_abort());
        assert!(!UploadError::Stream("disk full".into()).is_abort());
    }
}
