//! Part and session data model.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::{UploadError, ValidationError};

/// Metadata declared for a file part, captured the instant its headers are
/// parsed and immutable afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct PartDescriptor {
    pub field_name: String,
    pub declared_filename: String,
    pub declared_mime: String,
    /// Zero-based index among the session's file parts, in wire order.
    pub sequence_index: usize,
}

/// Verdict recorded for a part once validation has run.
#[derive(Debug, Clone)]
pub enum PartOutcome {
    Accepted,
    Rejected(ValidationError),
}

/// Post-processing lifecycle of an accepted part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PostProcessState {
    /// Not eligible; the raw file is final.
    None,
    Pending,
    Running,
    Done,
    Failed,
}

/// Per-part state, created when validation completes.
///
/// Mutated only by the streaming writer and the post-processing coordinator,
/// never after the session reaches a terminal state.
#[derive(Debug)]
pub struct PartResult {
    pub descriptor: PartDescriptor,
    pub outcome: PartOutcome,
    pub bytes_written: u64,
    /// Generated filename the raw bytes were stored under.
    pub stored_filename: Option<String>,
    pub storage_path: Option<PathBuf>,
    pub post_process: PostProcessState,
    pub final_path: Option<PathBuf>,
    pub final_size: Option<u64>,
    /// Recovered post-processing failure, surfaced as a session warning.
    pub post_process_error: Option<String>,
}

impl PartResult {
    pub fn accepted(
        descriptor: PartDescriptor,
        stored_filename: String,
        storage_path: PathBuf,
        bytes_written: u64,
    ) -> Self {
        PartResult {
            descriptor,
            outcome: PartOutcome::Accepted,
            bytes_written,
            stored_filename: Some(stored_filename),
            storage_path: Some(storage_path),
            post_process: PostProcessState::None,
            final_path: None,
            final_size: None,
            post_process_error: None,
        }
    }

    pub fn rejected(descriptor: PartDescriptor, reason: ValidationError) -> Self {
        PartResult {
            descriptor,
            outcome: PartOutcome::Rejected(reason),
            bytes_written: 0,
            stored_filename: None,
            storage_path: None,
            post_process: PostProcessState::None,
            final_path: None,
            final_size: None,
            post_process_error: None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self.outcome, PartOutcome::Accepted)
    }
}

/// Session lifecycle: `Receiving` while parts arrive, `Draining` once the
/// demuxer hits end-of-stream and post-processing is still settling, then
/// exactly one terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Receiving,
    Draining,
    Completed,
    Failed,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Aborted
        )
    }
}

/// One successfully stored file in a completed session.
#[derive(Debug, Clone, Serialize)]
pub struct StoredFile {
    pub field_name: String,
    pub original_filename: String,
    pub mime_type: String,
    pub stored_filename: String,
    pub path: PathBuf,
    pub size: u64,
}

/// Payload of a session that reached `Completed`.
#[derive(Debug, Serialize)]
pub struct CompletedUpload {
    pub files: Vec<StoredFile>,
    pub fields: BTreeMap<String, String>,
    /// Non-fatal issues, e.g. a video stored uncompressed after a failed
    /// compression attempt.
    pub warnings: Vec<String>,
}

/// Terminal result of an upload session.
#[derive(Debug)]
pub enum UploadOutcome {
    Completed(CompletedUpload),
    Failed { errors: Vec<UploadError> },
    Aborted { errors: Vec<UploadError> },
}

impl UploadOutcome {
    /// First fatal error of a failed or aborted session, if any.
    pub fn first_error(&self) -> Option<&UploadError> {
        match self {
            UploadOutcome::Completed(_) => None,
            UploadOutcome::Failed { errors } | UploadOutcome::Aborted { errors } => errors.first(),
        }
    }
}
