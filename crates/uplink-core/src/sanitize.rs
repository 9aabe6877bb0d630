//! Filename sanitization for client-declared names.
//!
//! Stored files never use the client's filename (storage generates its own
//! collision-resistant names); this only guards the name echoed back in
//! results and used to pick a file extension.

use crate::error::ValidationError;

const MAX_FILENAME_LENGTH: usize = 255;

/// Sanitize a client-declared filename: strip any directory components,
/// reject traversal sequences, and restrict the character set.
pub fn sanitize_filename(filename: &str) -> Result<String, ValidationError> {
    let filename_only = std::path::Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);

    if filename_only.contains("..") {
        return Err(ValidationError::InvalidFilename(
            "filename contains path traversal".to_string(),
        ));
    }

    let sanitized: String = filename_only
        .chars()
        .take(MAX_FILENAME_LENGTH)
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.trim().is_empty() || sanitized.len() < 3 {
        return Ok("file".to_string());
    }

    Ok(sanitized)
}

/// File extension with its leading dot (`".mp4"`), lowercased, or an empty
/// string when the name has none.
pub fn file_extension(filename: &str) -> String {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}
