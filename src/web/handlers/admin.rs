//! Synchronous refresh triggers

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::info;

use crate::errors::{AppError, AppResult};
use crate::indexer::IndexOutcome;
use crate::registry::RegistrySnapshot;
use crate::web::AppState;

/// `POST /admin/registry/refresh`
pub async fn refresh_registry(State(state): State<AppState>) -> AppResult<Json<RegistrySnapshot>> {
    info!("Registry refresh requested");
    let snapshot = state.registry.refresh_registry().await?;
    Ok(Json(snapshot))
}

/// `POST /admin/index/{chain_id}`
pub async fn index_chain(
    State(state): State<AppState>,
    Path(chain_id): Path<String>,
) -> AppResult<Json<IndexOutcome>> {
    let chain_id = chain_id
        .parse::<u64>()
        .map_err(|_| AppError::validation("Invalid chainId"))?;

    info!("Re-index of chain {} requested", chain_id);
    let outcome = state.indexer.index_platform(chain_id).await?;
    Ok(Json(outcome))
}
