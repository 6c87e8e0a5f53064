//! Response cache statistics endpoint.

use std::time::Instant;

use axum::extract::State;

use colloquy_types::cache::CacheStats;

use crate::http::response::ApiResponse;
use crate::state::AppState;

/// GET /api/v1/cache/stats
pub async fn get_stats(State(state): State<AppState>) -> ApiResponse<CacheStats> {
    let started = Instant::now();
    ApiResponse::success(state.orchestrator.cache().stats(), started)
}
