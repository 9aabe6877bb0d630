//! End-to-end pipeline tests over hand-built multipart bodies and a
//! temporary upload directory.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;

use uplink_core::{UploadError, UploadLimits, UploadOutcome};
use uplink_pipeline::{compressed_output_path, UploadPipeline, VideoCompressor};
use uplink_storage::LocalStore;

const BOUNDARY: &str = "XBOUNDARY";
const MIB: usize = 1024 * 1024;

struct FilePart {
    name: &'static str,
    filename: &'static str,
    mime: &'static str,
    size: usize,
}

fn multipart_body(fields: &[(&str, &str)], files: &[FilePart]) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, value) in fields {
        out.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        out.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        );
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    for file in files {
        out.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        out.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                file.name, file.filename, file.mime
            )
            .as_bytes(),
        );
        out.extend_from_slice(&vec![0xabu8; file.size]);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    out
}

/// Stream a body in transport-sized chunks, as a socket would deliver it.
fn body_stream(
    body: Vec<u8>,
) -> impl futures::Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    let chunks: Vec<Result<Bytes, std::io::Error>> = body
        .chunks(16 * 1024)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    stream::iter(chunks)
}

/// Test compressor: writes a half-size output file, or fails on demand.
struct MockCompressor {
    fail: bool,
    calls: AtomicUsize,
}

impl MockCompressor {
    fn ok() -> Self {
        MockCompressor {
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        MockCompressor {
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoCompressor for MockCompressor {
    async fn compress(&self, input: &Path) -> anyhow::Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("mock transcoder refused the file");
        }
        let raw_len = tokio::fs::metadata(input).await?.len() as usize;
        let output = compressed_output_path(input);
        tokio::fs::write(&output, vec![0xcdu8; raw_len / 2]).await?;
        Ok(output)
    }
}

async fn setup<C: VideoCompressor + 'static>(
    compressor: Arc<C>,
) -> (tempfile::TempDir, UploadPipeline) {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).await.unwrap();
    let pipeline =
        UploadPipeline::new(Arc::new(store), compressor).with_postprocess_concurrency(2);
    (dir, pipeline)
}

async fn files_on_disk(dir: &tempfile::TempDir) -> Vec<PathBuf> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
    while let Some(entry) = entries.next_entry().await.unwrap() {
        names.push(entry.path());
    }
    names
}

#[tokio::test]
async fn small_image_completes_without_post_processing() {
    let compressor = Arc::new(MockCompressor::ok());
    let (dir, pipeline) = setup(Arc::clone(&compressor)).await;
    let limits = UploadLimits {
        max_file_size_bytes: 5 * MIB as u64,
        ..UploadLimits::default()
    };

    let body = multipart_body(
        &[("caption", "beach day")],
        &[FilePart {
            name: "photo",
            filename: "beach.jpg",
            mime: "image/jpeg",
            size: 2 * MIB,
        }],
    );
    let outcome = pipeline.ingest(body_stream(body), BOUNDARY, &limits).await;

    let UploadOutcome::Completed(completed) = outcome else {
        panic!("expected completed session");
    };
    assert_eq!(completed.files.len(), 1);
    let file = &completed.files[0];
    assert_eq!(file.size, 2 * MIB as u64);
    assert_eq!(file.field_name, "photo");
    assert_eq!(file.original_filename, "beach.jpg");
    assert_eq!(file.mime_type, "image/jpeg");
    assert!(file.stored_filename.starts_with("upload-"));
    assert!(file.stored_filename.ends_with(".jpg"));
    assert_eq!(completed.fields.get("caption").map(String::as_str), Some("beach day"));
    assert!(completed.warnings.is_empty());
    assert_eq!(compressor.calls(), 0);
    assert_eq!(files_on_disk(&dir).await.len(), 1);
}

#[tokio::test]
async fn oversized_file_fails_and_leaves_no_bytes() {
    let (dir, pipeline) = setup(Arc::new(MockCompressor::ok())).await;
    let limits = UploadLimits {
        max_file_size_bytes: 5 * MIB as u64,
        ..UploadLimits::default()
    };

    let body = multipart_body(
        &[],
        &[FilePart {
            name: "video",
            filename: "long.mp4",
            mime: "video/mp4",
            size: 8 * MIB,
        }],
    );
    let outcome = pipeline.ingest(body_stream(body), BOUNDARY, &limits).await;

    let UploadOutcome::Failed { errors } = outcome else {
        panic!("expected failed session");
    };
    assert!(matches!(
        errors.first(),
        Some(UploadError::LimitExceeded { max, .. }) if *max == 5 * MIB as u64
    ));
    assert!(files_on_disk(&dir).await.is_empty());
}

#[tokio::test]
async fn large_video_is_compressed_and_substituted() {
    let compressor = Arc::new(MockCompressor::ok());
    let (dir, pipeline) = setup(Arc::clone(&compressor)).await;
    let limits = UploadLimits {
        max_file_size_bytes: 8 * MIB as u64,
        compression_threshold_bytes: 5 * MIB as u64,
        ..UploadLimits::default()
    };

    let body = multipart_body(
        &[],
        &[FilePart {
            name: "video",
            filename: "clip.mp4",
            mime: "video/mp4",
            size: 7 * MIB,
        }],
    );
    let outcome = pipeline.ingest(body_stream(body), BOUNDARY, &limits).await;

    let UploadOutcome::Completed(completed) = outcome else {
        panic!("expected completed session");
    };
    assert_eq!(compressor.calls(), 1);
    let file = &completed.files[0];
    assert!(file.size < 7 * MIB as u64);
    assert!(
        file.path.to_string_lossy().contains("_compressed"),
        "final path should reference the compressed variant"
    );
    assert!(completed.warnings.is_empty());
    // raw and compressed variants both present
    assert_eq!(files_on_disk(&dir).await.len(), 2);
}

#[tokio::test]
async fn fourth_file_fails_the_session_and_deletes_the_first_three() {
    let (dir, pipeline) = setup(Arc::new(MockCompressor::ok())).await;
    let limits = UploadLimits {
        max_file_count: 3,
        ..UploadLimits::default()
    };

    let file = |filename| FilePart {
        name: "photo",
        filename,
        mime: "image/png",
        size: 64 * 1024,
    };
    let body = multipart_body(
        &[],
        &[file("a.png"), file("b.png"), file("c.png"), file("d.png")],
    );
    let outcome = pipeline.ingest(body_stream(body), BOUNDARY, &limits).await;

    let UploadOutcome::Failed { errors } = outcome else {
        panic!("expected failed session");
    };
    assert!(matches!(
        errors.first(),
        Some(UploadError::Validation(
            uplink_core::ValidationError::TooManyFiles { index: 4, max: 3 }
        ))
    ));
    assert!(files_on_disk(&dir).await.is_empty());
}

#[tokio::test]
async fn client_disconnect_aborts_and_removes_partial_file() {
    let (dir, pipeline) = setup(Arc::new(MockCompressor::ok())).await;
    let limits = UploadLimits::default();

    let mut head = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"video\"; filename=\"big.mp4\"\r\nContent-Type: video/mp4\r\n\r\n"
    )
    .into_bytes();
    head.extend_from_slice(&vec![0xabu8; MIB]);
    let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
        Ok(Bytes::from(head)),
        Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "client went away",
        )),
    ];
    let outcome = pipeline
        .ingest(stream::iter(chunks), BOUNDARY, &limits)
        .await;

    let UploadOutcome::Aborted { errors } = outcome else {
        panic!("expected aborted session");
    };
    assert!(matches!(errors.first(), Some(UploadError::ClientAbort)));
    assert!(files_on_disk(&dir).await.is_empty());
}

#[tokio::test]
async fn failed_compression_downgrades_to_raw_file() {
    let compressor = Arc::new(MockCompressor::failing());
    let (dir, pipeline) = setup(Arc::clone(&compressor)).await;
    let limits = UploadLimits {
        max_file_size_bytes: 8 * MIB as u64,
        compression_threshold_bytes: 5 * MIB as u64,
        ..UploadLimits::default()
    };

    let body = multipart_body(
        &[],
        &[FilePart {
            name: "video",
            filename: "clip.mp4",
            mime: "video/mp4",
            size: 6 * MIB,
        }],
    );
    let outcome = pipeline.ingest(body_stream(body), BOUNDARY, &limits).await;

    // post-processing failure must not change the session outcome
    let UploadOutcome::Completed(completed) = outcome else {
        panic!("expected completed session despite compression failure");
    };
    assert_eq!(compressor.calls(), 1);
    assert_eq!(completed.warnings.len(), 1);
    let file = &completed.files[0];
    assert_eq!(file.size, 6 * MIB as u64);
    assert!(!file.path.to_string_lossy().contains("_compressed"));
    assert_eq!(files_on_disk(&dir).await.len(), 1);
}

#[tokio::test]
async fn late_fatal_error_rolls_back_compressed_outputs_too() {
    let (dir, pipeline) = setup(Arc::new(MockCompressor::ok())).await;
    let limits = UploadLimits {
        max_file_size_bytes: 8 * MIB as u64,
        compression_threshold_bytes: 5 * MIB as u64,
        ..UploadLimits::default()
    };

    let body = multipart_body(
        &[],
        &[
            FilePart {
                name: "video",
                filename: "clip.mp4",
                mime: "video/mp4",
                size: 6 * MIB,
            },
            FilePart {
                name: "doc",
                filename: "notes.pdf",
                mime: "application/pdf",
                size: 1024,
            },
        ],
    );
    let outcome = pipeline.ingest(body_stream(body), BOUNDARY, &limits).await;

    let UploadOutcome::Failed { errors } = outcome else {
        panic!("expected failed session");
    };
    assert!(matches!(
        errors.first(),
        Some(UploadError::Validation(
            uplink_core::ValidationError::DisallowedContentType { .. }
        ))
    ));
    assert!(files_on_disk(&dir).await.is_empty());
}

/// Compressor that writes its output file and then never returns, like a
/// transcoder wedged mid-encode.
struct StallingCompressor;

#[async_trait]
impl VideoCompressor for StallingCompressor {
    async fn compress(&self, input: &Path) -> anyhow::Result<PathBuf> {
        let output = compressed_output_path(input);
        tokio::fs::write(&output, b"partial transcode").await?;
        std::future::pending::<()>().await;
        unreachable!()
    }
}

#[tokio::test]
async fn timed_out_session_rolls_back_compressed_output() {
    let (dir, pipeline) = setup(Arc::new(StallingCompressor)).await;
    let limits = UploadLimits {
        max_file_size_bytes: 8 * MIB as u64,
        compression_threshold_bytes: 5 * MIB as u64,
        session_timeout: Duration::from_secs(2),
        ..UploadLimits::default()
    };

    let body = multipart_body(
        &[],
        &[FilePart {
            name: "video",
            filename: "clip.mp4",
            mime: "video/mp4",
            size: 6 * MIB,
        }],
    );
    let outcome = pipeline.ingest(body_stream(body), BOUNDARY, &limits).await;

    let UploadOutcome::Aborted { errors } = outcome else {
        panic!("expected aborted session");
    };
    assert!(matches!(
        errors.first(),
        Some(UploadError::Timeout { limit_secs: 2 })
    ));
    // neither the raw file nor the half-written compressed output survives
    assert!(files_on_disk(&dir).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn stalled_session_times_out_and_aborts() {
    let (dir, pipeline) = setup(Arc::new(MockCompressor::ok())).await;
    let limits = UploadLimits {
        session_timeout: Duration::from_secs(5),
        ..UploadLimits::default()
    };

    let outcome = pipeline
        .ingest(
            stream::pending::<Result<Bytes, std::io::Error>>(),
            BOUNDARY,
            &limits,
        )
        .await;

    let UploadOutcome::Aborted { errors } = outcome else {
        panic!("expected aborted session");
    };
    assert!(matches!(
        errors.first(),
        Some(UploadError::Timeout { limit_secs: 5 })
    ));
    assert!(files_on_disk(&dir).await.is_empty());
}
