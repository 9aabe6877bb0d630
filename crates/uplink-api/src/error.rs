//! HTTP mapping for pipeline errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use uplink_core::UploadError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// An error response: `{error, message}` with a status derived from the
/// first fatal error of the session.
#[derive(Debug)]
pub struct HttpError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl HttpError {
    pub fn bad_request(error: &str, message: impl Into<String>) -> Self {
        HttpError {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody {
                error: error.to_string(),
                message: message.into(),
            },
        }
    }

    pub fn from_upload(err: Option<&UploadError>) -> Self {
        match err {
            Some(e) => HttpError {
                status: StatusCode::from_u16(e.http_status_code())
                    .unwrap_or(StatusCode::BAD_REQUEST),
                body: ErrorBody {
                    error: e.error_code().to_string(),
                    message: e.to_string(),
                },
            },
            // a failed session always carries at least one error; this is a
            // belt-and-braces fallback
            None => HttpError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: ErrorBody {
                    error: "INTERNAL_ERROR".to_string(),
                    message: "upload failed".to_string(),
                },
            },
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
