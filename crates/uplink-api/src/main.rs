use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use uplink_api::config::Config;
use uplink_api::state::AppState;
use uplink_pipeline::{FfmpegCompressor, UploadPipeline};
use uplink_storage::LocalStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("uplink=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;

    let store = LocalStore::new(&config.upload_dir).await?;
    let compressor = FfmpegCompressor::new(config.ffmpeg_path.clone());
    let mut pipeline = UploadPipeline::new(Arc::new(store), Arc::new(compressor));
    if let Some(max) = config.postprocess_concurrency {
        pipeline = pipeline.with_postprocess_concurrency(max);
    }

    let state = Arc::new(AppState {
        pipeline,
        limits: config.limits.clone(),
    });
    let app = uplink_api::router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(
        addr = %config.bind_addr,
        upload_dir = %config.upload_dir.display(),
        "uplink listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutting down");
}
