//! Plain-text error responses
//!
//! Every error leaving a handler goes through [`IntoResponse`] for
//! [`AppError`] so status codes stay consistent across routes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::errors::AppError;
use crate::responder::text_response;

pub const USAGE_MESSAGE: &str = "Use /token/<chainId>/<address>";
pub const NOT_FOUND_MESSAGE: &str = "Not found";

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Validation { message } => text_response(StatusCode::BAD_REQUEST, message),
            AppError::UpstreamStatus { status, .. } => {
                text_response(StatusCode::BAD_GATEWAY, format!("Upstream {status}"))
            }
            other if other.is_upstream() => {
                error!("Upstream request failed: {}", other);
                text_response(StatusCode::BAD_GATEWAY, "Upstream unavailable")
            }
            other => {
                error!("Request failed: {}", other);
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
        }
    }
}

pub fn not_found() -> Response {
    text_response(StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE)
}

pub fn usage() -> Response {
    text_response(StatusCode::BAD_REQUEST, USAGE_MESSAGE)
}
