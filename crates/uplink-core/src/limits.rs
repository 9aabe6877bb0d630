//! Upload limits configuration.

use std::time::Duration;

const MIB: u64 = 1024 * 1024;

/// A MIME allow pattern: either an exact type (`image/jpeg`), a major-type
/// wildcard (`image/*`), or the match-all `*/*`.
///
/// Matching normalizes the candidate first: parameters are stripped
/// (`video/mp4; codecs=avc1` matches `video/*`) and comparison is
/// case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimePattern(String);

impl MimePattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        MimePattern(pattern.into().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, content_type: &str) -> bool {
        let normalized = normalize_mime(content_type);
        if self.0 == "*" || self.0 == "*/*" {
            return true;
        }
        if let Some(major) = self.0.strip_suffix("/*") {
            return normalized
                .split('/')
                .next()
                .is_some_and(|candidate| candidate == major);
        }
        normalized == self.0
    }
}

/// Strip MIME parameters and lowercase (`image/JPEG; charset=utf-8` -> `image/jpeg`).
pub fn normalize_mime(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_lowercase()
}

/// Limits applied to a single upload session.
///
/// A pure value object: the pipeline never mutates it, and every component
/// that needs a bound reads it from here.
#[derive(Debug, Clone)]
pub struct UploadLimits {
    /// Maximum size of any single file part, enforced while streaming.
    pub max_file_size_bytes: u64,
    /// Maximum number of file parts per session.
    pub max_file_count: usize,
    /// Maximum size of a plain (non-file) field value.
    pub max_field_size_bytes: usize,
    /// Maximum number of plain fields per session.
    pub max_field_count: usize,
    /// MIME patterns accepted for file parts.
    pub allowed_mime_patterns: Vec<MimePattern>,
    /// Upper bound on bytes of a part resident in memory at once.
    pub buffer_size_bytes: usize,
    /// Videos strictly larger than this are handed to the compressor.
    pub compression_threshold_bytes: u64,
    /// Wall-clock budget for the whole session, including post-processing.
    pub session_timeout: Duration,
}

impl Default for UploadLimits {
    fn default() -> Self {
        UploadLimits {
            max_file_size_bytes: 500 * MIB,
            max_file_count: 3,
            max_field_size_bytes: MIB as usize,
            max_field_count: 20,
            allowed_mime_patterns: vec![MimePattern::new("image/*"), MimePattern::new("video/*")],
            buffer_size_bytes: 64 * 1024,
            compression_threshold_bytes: 5 * MIB,
            session_timeout: Duration::from_secs(15 * 60),
        }
    }
}

impl UploadLimits {
    pub fn allows_mime(&self, content_type: &str) -> bool {
        self.allowed_mime_patterns
            .iter()
            .any(|p| p.matches(content_type))
    }
}
