//! The upload route.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use uplink_core::UploadOutcome;

use crate::error::HttpError;
use crate::state::AppState;

/// `POST /uploads` — streaming multipart ingestion.
///
/// The body is consumed as a raw byte stream and handed to the pipeline;
/// nothing is buffered here, so size policing belongs entirely to the
/// pipeline's limits.
pub async fn upload(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let boundary = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(uplink_pipeline::parse_boundary);
    let Some(boundary) = boundary else {
        return HttpError::bad_request(
            "INVALID_CONTENT_TYPE",
            "Expected multipart/form-data with a boundary",
        )
        .into_response();
    };

    let stream = request.into_body().into_data_stream();
    let outcome = state
        .pipeline
        .ingest(stream, &boundary, &state.limits)
        .await;

    match outcome {
        UploadOutcome::Completed(completed) => (StatusCode::OK, Json(completed)).into_response(),
        failed => HttpError::from_upload(failed.first_error()).into_response(),
    }
}
