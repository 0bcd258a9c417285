//! Token logo route and the catch-all fallback

use axum::{
    extract::{Path, State},
    http::Uri,
    response::{IntoResponse, Response},
};

use crate::web::AppState;
use crate::web::responses::{not_found, usage};

/// `GET /token/{chain_id}/{address}`
pub async fn serve_token_logo(
    State(state): State<AppState>,
    Path((chain_id, address)): Path<(String, String)>,
) -> Response {
    resolve(&state, &chain_id, &address).await
}

/// Anything unrouted: malformed `/token/...` paths get the usage hint,
/// everything else is a 404
pub async fn fallback(State(state): State<AppState>, uri: Uri) -> Response {
    let Some(rest) = uri.path().strip_prefix("/token/") else {
        return not_found();
    };

    let parts: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
    match parts.as_slice() {
        [chain_id, address] => resolve(&state, chain_id, address).await,
        _ => usage(),
    }
}

async fn resolve(state: &AppState, chain_id: &str, address: &str) -> Response {
    match state.responder.resolve(chain_id, address).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}
