//! Video compression via the ffmpeg CLI.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::Context;
use async_trait::async_trait;
use tokio::process::Command;

use crate::postprocess::{compressed_output_path, VideoCompressor};

/// [`VideoCompressor`] shelling out to ffmpeg.
pub struct FfmpegCompressor {
    ffmpeg_path: String,
}

impl FfmpegCompressor {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        FfmpegCompressor {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }
}

#[async_trait]
impl VideoCompressor for FfmpegCompressor {
    async fn compress(&self, input: &Path) -> anyhow::Result<PathBuf> {
        let output = compressed_output_path(input);
        tracing::info!(
            input = %input.display(),
            output = %output.display(),
            "Starting ffmpeg compression"
        );

        let status = Command::new(&self.ffmpeg_path)
            .arg("-y")
            .arg("-i")
            .arg(input)
            .args([
                "-vcodec",
                "libx264",
                "-crf",
                "28",
                "-preset",
                "fast",
                "-acodec",
                "aac",
                "-movflags",
                "+faststart",
            ])
            .arg(&output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            // an aborted task must not leave ffmpeg writing to the output
            .kill_on_drop(true)
            .status()
            .await
            .with_context(|| format!("failed to run {}", self.ffmpeg_path))?;

        if !status.success() {
            // don't leave a half-written output behind
            let _ = tokio::fs::remove_file(&output).await;
            anyhow::bail!("ffmpeg exited with status {status}");
        }

        Ok(output)
    }
}
