//! Dashboard statistics and maintenance endpoints.

use std::time::Instant;

use axum::extract::State;

use dmrelay_core::sync::{RelayStats, ReloadReport};

use crate::http::error::AppError;
use crate::http::extractors::auth::Operator;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// GET /api/v1/stats
pub async fn get_stats(State(state): State<AppState>, _operator: Operator) -> ApiResponse<RelayStats> {
    ApiResponse::success(state.sync.stats(), Instant::now())
}

/// POST /api/v1/reload - rebuild the cache from storage.
pub async fn reload(
    State(state): State<AppState>,
    _operator: Operator,
) -> Result<ApiResponse<ReloadReport>, AppError> {
    let start = Instant::now();
    let report = state.sync.reload().await?;
    Ok(ApiResponse::success(report, start))
}
