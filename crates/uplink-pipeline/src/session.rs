//! Session driver and aggregation.
//!
//! One [`UploadSession`] per request, owned by the handler and destroyed
//! when it returns. The driver walks the demuxer in wire order, validates
//! each file part before touching its body, streams accepted parts to
//! storage, hands qualifying videos to the post-processing coordinator, and
//! only reaches `Completed` after every task has settled. Any fatal error
//! flips the session to `Failed` (or `Aborted` for disconnect/timeout) and
//! rolls back every path the session wrote.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

use uplink_core::limits::normalize_mime;
use uplink_core::sanitize::sanitize_filename;
use uplink_core::{
    CompletedUpload, PartDescriptor, PartResult, SessionState, StoredFile, UploadError,
    UploadLimits, UploadOutcome, ValidationError,
};
use uplink_storage::BlobStore;

use crate::demux::{FileBody, MultipartDemuxer, RawPart};
use crate::failure::FailureTracker;
use crate::postprocess::{PostProcessingCoordinator, SharedPart, VideoCompressor};
use crate::resource::{NoopResourceManager, ResourceManager};
use crate::{validator, writer};

/// Live state of one upload session.
pub struct UploadSession {
    pub id: Uuid,
    pub state: SessionState,
    pub limits: UploadLimits,
    parts: Vec<SharedPart>,
    fields: BTreeMap<String, String>,
    tracker: FailureTracker,
    coordinator: PostProcessingCoordinator,
    pub created_at: DateTime<Utc>,
}

impl UploadSession {
    fn new(limits: UploadLimits, coordinator: PostProcessingCoordinator) -> Self {
        UploadSession {
            id: Uuid::new_v4(),
            state: SessionState::Receiving,
            limits,
            parts: Vec::new(),
            fields: BTreeMap::new(),
            tracker: FailureTracker::new(),
            coordinator,
            created_at: Utc::now(),
        }
    }

    fn push_part(&mut self, part: PartResult) -> SharedPart {
        let shared = Arc::new(Mutex::new(part));
        self.parts.push(Arc::clone(&shared));
        shared
    }

    /// Assemble the terminal outcome. Preconditions: the demuxer is done and
    /// every post-processing task has settled. If the tracker flagged a
    /// failure, rolls back and reports it instead.
    async fn finalize(mut self, store: &dyn BlobStore) -> UploadOutcome {
        debug_assert_eq!(self.coordinator.pending_tasks(), 0);

        if self.tracker.has_failed() {
            self.tracker.rollback(store).await;

            let aborted = self.tracker.first_error_is_abort();
            self.state = if aborted {
                SessionState::Aborted
            } else {
                SessionState::Failed
            };
            tracing::warn!(state = ?self.state, "Upload session rolled back");

            let errors = self.tracker.into_errors();
            return if aborted {
                UploadOutcome::Aborted { errors }
            } else {
                UploadOutcome::Failed { errors }
            };
        }

        self.state = SessionState::Completed;

        let mut files = Vec::with_capacity(self.parts.len());
        let mut warnings = Vec::new();
        for part in &self.parts {
            let p = part.lock().await;
            // a rejected part always fails the session, so everything here
            // was accepted and fully drained
            let (Some(stored_filename), Some(storage_path)) =
                (p.stored_filename.clone(), p.storage_path.clone())
            else {
                continue;
            };
            if let Some(err) = &p.post_process_error {
                warnings.push(format!(
                    "{}: stored uncompressed ({err})",
                    p.descriptor.declared_filename
                ));
            }
            let original_filename = sanitize_filename(&p.descriptor.declared_filename)
                .unwrap_or_else(|_| "file".to_string());
            files.push(StoredFile {
                field_name: p.descriptor.field_name.clone(),
                original_filename,
                mime_type: normalize_mime(&p.descriptor.declared_mime),
                stored_filename,
                path: p.final_path.clone().unwrap_or(storage_path),
                size: p.final_size.unwrap_or(p.bytes_written),
            });
        }

        tracing::info!(files = files.len(), "Upload session completed");
        UploadOutcome::Completed(CompletedUpload {
            files,
            fields: self.fields,
            warnings,
        })
    }
}

/// The pipeline's long-lived collaborators, shared across sessions.
pub struct UploadPipeline {
    store: Arc<dyn BlobStore>,
    compressor: Arc<dyn VideoCompressor>,
    resources: Arc<dyn ResourceManager>,
    postprocess_concurrency: usize,
}

impl UploadPipeline {
    pub fn new(store: Arc<dyn BlobStore>, compressor: Arc<dyn VideoCompressor>) -> Self {
        UploadPipeline {
            store,
            compressor,
            resources: Arc::new(NoopResourceManager),
            postprocess_concurrency: default_concurrency(),
        }
    }

    pub fn with_resources(mut self, resources: Arc<dyn ResourceManager>) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_postprocess_concurrency(mut self, max: usize) -> Self {
        self.postprocess_concurrency = max.max(1);
        self
    }

    /// Ingest one multipart request body as a full session.
    pub async fn ingest<S, E>(
        &self,
        stream: S,
        boundary: &str,
        limits: &UploadLimits,
    ) -> UploadOutcome
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    {
        let session = UploadSession::new(
            limits.clone(),
            PostProcessingCoordinator::new(Arc::clone(&self.compressor), self.postprocess_concurrency),
        );
        let span = tracing::info_span!("upload_session", session_id = %session.id);
        self.drive(session, stream, boundary).instrument(span).await
    }

    async fn drive<S, E>(
        &self,
        mut session: UploadSession,
        stream: S,
        boundary: &str,
    ) -> UploadOutcome
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    {
        let limit_secs = session.limits.session_timeout.as_secs();
        let deadline = tokio::time::Instant::now() + session.limits.session_timeout;

        let receive_timed_out =
            tokio::time::timeout_at(deadline, self.receive(&mut session, stream, boundary))
                .await
                .is_err();
        if receive_timed_out {
            session.tracker.record_fatal(UploadError::Timeout { limit_secs });
            session.coordinator.shutdown().await;
        } else {
            // settle post-processing before any terminal state; on failure
            // the outputs must exist (or be known dead) before rollback runs
            if tokio::time::timeout_at(deadline, session.coordinator.await_all())
                .await
                .is_err()
            {
                session.tracker.record_fatal(UploadError::Timeout { limit_secs });
                session.coordinator.shutdown().await;
            }
        }

        session.finalize(self.store.as_ref()).await
    }

    /// Parse loop: strictly in wire order, one part at a time. Returns when
    /// the stream ends or a fatal error halts the session.
    async fn receive<S, E>(&self, session: &mut UploadSession, stream: S, boundary: &str)
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    {
        let mut demuxer = MultipartDemuxer::new(stream, boundary, session.limits.clone());
        loop {
            match demuxer.next_part().await {
                Ok(Some(RawPart::Field { name, value })) => {
                    session.fields.insert(name, value);
                }
                Ok(Some(RawPart::File { descriptor, body })) => {
                    if let Err(fatal) = self.ingest_file(session, descriptor, body).await {
                        session.tracker.record_fatal(fatal);
                        return;
                    }
                }
                Ok(None) => {
                    session.state = SessionState::Draining;
                    return;
                }
                Err(e) => {
                    session.tracker.record_fatal(e);
                    return;
                }
            }
        }
    }

    async fn ingest_file(
        &self,
        session: &mut UploadSession,
        descriptor: PartDescriptor,
        mut body: FileBody,
    ) -> Result<(), UploadError> {
        let verdict: Result<String, ValidationError> =
            validator::validate(&descriptor, &session.limits)
                .and_then(|()| sanitize_filename(&descriptor.declared_filename));

        let safe_filename = match verdict {
            Ok(name) => name,
            Err(reason) => {
                tracing::info!(
                    part_index = descriptor.sequence_index,
                    field = %descriptor.field_name,
                    error = %reason,
                    "Rejected file part"
                );
                // the sub-stream is drained and discarded, never persisted;
                // the session is failing anyway, so a drain error is moot
                let _ = body.discard().await;
                session.push_part(PartResult::rejected(descriptor, reason.clone()));
                return Err(reason.into());
            }
        };

        let stored_filename = self.store.generate_filename(&safe_filename);
        let mut sink = self
            .store
            .create_sink(&stored_filename)
            .await
            .map_err(|e| UploadError::Stream(e.to_string()))?;
        let storage_path = sink.path().to_path_buf();
        // tracked before the first byte lands, so rollback always sees it
        session.tracker.track_path(storage_path.clone());

        tracing::info!(
            part_index = descriptor.sequence_index,
            stored_filename = %stored_filename,
            mime = %descriptor.declared_mime,
            "Streaming file part to storage"
        );

        match writer::stream_to_sink(
            &mut body,
            sink.as_mut(),
            &session.limits,
            self.resources.as_ref(),
        )
        .await
        {
            Ok(_) => {
                let bytes_written = sink
                    .finish()
                    .await
                    .map_err(|e| UploadError::Stream(e.to_string()))?;
                let part = session.push_part(PartResult::accepted(
                    descriptor,
                    stored_filename,
                    storage_path,
                    bytes_written,
                ));
                // the compressed output is registered before the task can
                // write it, so even an aborted task rolls back cleanly
                if let Some(output) = session.coordinator.maybe_spawn(part, &session.limits).await {
                    session.tracker.track_path(output);
                }
                Ok(())
            }
            Err(e) => {
                if let Err(abort_err) = sink.abort().await {
                    tracing::warn!(
                        error = %abort_err,
                        "Failed to remove partial file after write error"
                    );
                }
                Err(e)
            }
        }
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
}
