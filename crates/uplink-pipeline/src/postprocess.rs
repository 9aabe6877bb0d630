//! Out-of-band post-processing of written files.
//!
//! Large videos are compressed after their raw bytes are durable, without
//! blocking ingestion of later parts. Tasks run under a semaphore so a burst
//! of uploads cannot fan out unbounded ffmpeg processes. A failed transform
//! never fails the session: the part falls back to its raw file and the
//! failure is reported as a warning.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

use uplink_core::limits::normalize_mime;
use uplink_core::{PartDescriptor, PartResult, PostProcessState, UploadLimits};

/// Output path for a compressed variant: `<stem>_compressed<ext>` next to
/// the original.
pub fn compressed_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("upload");
    let ext = input
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    input.with_file_name(format!("{stem}_compressed{ext}"))
}

/// External transform collaborator. `compress` writes its output to
/// `output_path(input)` and returns that path; the input file is left
/// untouched. The output path must be known before the transform runs so a
/// session can roll it back even if the task never finishes.
#[async_trait]
pub trait VideoCompressor: Send + Sync {
    fn output_path(&self, input: &Path) -> PathBuf {
        compressed_output_path(input)
    }

    async fn compress(&self, input: &Path) -> anyhow::Result<PathBuf>;
}

/// A part result shared between the session and its post-processing task.
/// All folding back of task results happens under this lock.
pub type SharedPart = Arc<Mutex<PartResult>>;

pub struct PostProcessingCoordinator {
    compressor: Arc<dyn VideoCompressor>,
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<()>,
}

impl PostProcessingCoordinator {
    pub fn new(compressor: Arc<dyn VideoCompressor>, max_concurrency: usize) -> Self {
        PostProcessingCoordinator {
            compressor,
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
            tasks: JoinSet::new(),
        }
    }

    /// Only videos strictly larger than the compression threshold qualify.
    pub fn is_eligible(descriptor: &PartDescriptor, raw_size: u64, limits: &UploadLimits) -> bool {
        normalize_mime(&descriptor.declared_mime).starts_with("video/")
            && raw_size > limits.compression_threshold_bytes
    }

    /// Spawn a compression task for the part if it qualifies; otherwise
    /// finalize it immediately with its raw file. Returns the path the task
    /// will write, so the caller can register it for rollback before a single
    /// output byte exists.
    pub async fn maybe_spawn(&mut self, part: SharedPart, limits: &UploadLimits) -> Option<PathBuf> {
        let input = {
            let mut p = part.lock().await;
            match p.storage_path.clone() {
                Some(path) if Self::is_eligible(&p.descriptor, p.bytes_written, limits) => {
                    p.post_process = PostProcessState::Pending;
                    path
                }
                _ => {
                    p.final_path = p.storage_path.clone();
                    p.final_size = Some(p.bytes_written);
                    return None;
                }
            }
        };
        let planned_output = self.compressor.output_path(&input);

        let compressor = Arc::clone(&self.compressor);
        let semaphore = Arc::clone(&self.semaphore);
        self.tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                // semaphore is never closed while the coordinator lives
                return;
            };
            part.lock().await.post_process = PostProcessState::Running;

            let result = run_compression(compressor.as_ref(), &input).await;

            let mut p = part.lock().await;
            match result {
                Ok((output, size)) => {
                    tracing::info!(
                        input = %input.display(),
                        output = %output.display(),
                        size,
                        "Video compression finished"
                    );
                    p.final_path = Some(output);
                    p.final_size = Some(size);
                    p.post_process = PostProcessState::Done;
                }
                Err(e) => {
                    tracing::warn!(
                        input = %input.display(),
                        error = %e,
                        "Video compression failed, keeping the raw file"
                    );
                    p.final_path = p.storage_path.clone();
                    p.final_size = Some(p.bytes_written);
                    p.post_process = PostProcessState::Failed;
                    p.post_process_error = Some(e.to_string());
                }
            }
        });
        Some(planned_output)
    }

    /// Number of tasks not yet settled.
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Suspend until every spawned task has settled, success or failure.
    pub async fn await_all(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "Post-processing task did not settle cleanly");
            }
        }
    }

    /// Abort any still-running tasks and reap them. Used when the session's
    /// time budget expires mid-drain.
    pub async fn shutdown(&mut self) {
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}
    }
}

async fn run_compression(
    compressor: &dyn VideoCompressor,
    input: &Path,
) -> anyhow::Result<(PathBuf, u64)> {
    let output = compressor.compress(input).await?;
    let size = tokio::fs::metadata(&output)
        .await
        .with_context(|| format!("compressed output missing: {}", output.display()))?
        .len();
    Ok((output, size))
}
