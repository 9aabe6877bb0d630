//! Core types for the uplink ingestion pipeline.
//!
//! This crate holds the pure value objects shared by every other crate:
//! upload limits, the error taxonomy, and the part/session data model.
//! Nothing in here performs I/O.

pub mod error;
pub mod limits;
pub mod model;
pub mod sanitize;

pub use error::{UploadError, ValidationError};
pub use limits::{MimePattern, UploadLimits};
pub use model::{
    CompletedUpload, PartDescriptor, PartOutcome, PartResult, PostProcessState, SessionState,
    StoredFile, UploadOutcome,
};
pub use sanitize::sanitize_filename;
