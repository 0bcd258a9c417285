//! HTTP middleware

use axum::{
    extract::{Request, State},
    http::{Method, StatusCode, Uri, header},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{info, warn};

use super::AppState;
use crate::responder::{apply_cors_headers, text_response};

/// Request logging middleware
///
/// Logs every request with its status and timing
pub async fn request_logging_middleware(
    method: Method,
    uri: Uri,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let request_id = uuid::Uuid::new_v4().to_string();

    let response = next.run(request).await;
    let status = response.status().as_u16();
    let duration = start.elapsed();

    if status >= 500 {
        warn!(
            method = %method,
            uri = %uri,
            status = status,
            request_id = %request_id,
            duration_ms = duration.as_millis(),
            "HTTP request completed with error"
        );
    } else {
        info!(
            method = %method,
            uri = %uri,
            status = status,
            request_id = %request_id,
            duration_ms = duration.as_millis(),
            "HTTP request completed"
        );
    }

    response
}

/// Answer every `OPTIONS` request with an empty 200 before routing
pub async fn preflight_middleware(method: Method, request: Request, next: Next) -> Response {
    if method == Method::OPTIONS {
        let mut response = Response::default();
        apply_cors_headers(response.headers_mut());
        return response;
    }
    next.run(request).await
}

/// Require `Authorization: Bearer <admin_token>` when a token is configured
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.config.web.admin_token.as_deref() else {
        return next.run(request).await;
    };

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if presented == Some(expected) {
        next.run(request).await
    } else {
        warn!(uri = %request.uri(), "Rejected admin request without a valid token");
        text_response(StatusCode::UNAUTHORIZED, "Unauthorized")
    }
}
