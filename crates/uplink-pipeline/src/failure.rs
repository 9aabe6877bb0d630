//! Session failure tracking and all-or-nothing rollback.

use std::path::PathBuf;

use uplink_core::UploadError;
use uplink_storage::BlobStore;

/// Observes the whole pipeline for a session: every path written and every
/// fatal error. One fatal error fails the session and `rollback` deletes
/// everything the session ever put on disk, raw and compressed alike.
#[derive(Default)]
pub struct FailureTracker {
    errors: Vec<UploadError>,
    paths: Vec<PathBuf>,
}

impl FailureTracker {
    pub fn new() -> Self {
        FailureTracker::default()
    }

    /// Register a path belonging to this session. Must happen before the
    /// first byte lands there, so a crash mid-write still rolls back.
    pub fn track_path(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    pub fn record_fatal(&mut self, error: UploadError) {
        tracing::warn!(error = %error, "Session-fatal upload error");
        self.errors.push(error);
    }

    pub fn has_failed(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Whether the session should end as `Aborted` rather than `Failed`,
    /// decided by the first fatal error encountered.
    pub fn first_error_is_abort(&self) -> bool {
        self.errors.first().is_some_and(UploadError::is_abort)
    }

    /// Delete every tracked path. Deletion is idempotent, so paths already
    /// removed by a sink abort are fine.
    pub async fn rollback(&mut self, store: &dyn BlobStore) {
        for path in self.paths.drain(..) {
            match store.delete(&path).await {
                Ok(()) => tracing::debug!(path = %path.display(), "Rolled back session file"),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to roll back session file"
                    );
                }
            }
        }
    }

    pub fn into_errors(self) -> Vec<UploadError> {
        self.errors
    }
}
