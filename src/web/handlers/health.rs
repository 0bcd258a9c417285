//! Health check HTTP handlers

use axum::{Json, extract::State};
use serde::Serialize;

use crate::web::AppState;

pub const PUBLIC_ROUTES: [&str; 1] = ["/token/<chainId>/<address>"];

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub routes: Vec<&'static str>,
    pub source: String,
}

/// Served on both `/` and `/health`
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let source = state
        .config
        .upstream
        .token_list_host()
        .unwrap_or_else(|| state.config.upstream.token_list_base_url.clone());

    Json(HealthResponse {
        ok: true,
        routes: PUBLIC_ROUTES.to_vec(),
        source,
    })
}
