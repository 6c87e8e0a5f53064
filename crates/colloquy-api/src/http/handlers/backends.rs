//! Backend health and search variant endpoints.

use std::time::Instant;

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use colloquy_infra::llm::search::SearchAugmentedBackend;
use colloquy_types::config::SearchVariant;
use colloquy_types::llm::BackendHealth;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Current search variant plus the ones it can switch to.
#[derive(Debug, Serialize)]
pub struct SearchModelInfo {
    pub current: SearchVariant,
    pub available: Vec<SearchVariant>,
}

#[derive(Debug, Deserialize)]
pub struct SwitchSearchModel {
    /// Variant name or model id, case-insensitive.
    pub model: String,
}

fn search_backend(state: &AppState) -> Result<&SearchAugmentedBackend, AppError> {
    state
        .search
        .as_deref()
        .ok_or_else(|| AppError::NotFound("Search backend is not configured".to_string()))
}

fn model_info(search: &SearchAugmentedBackend) -> SearchModelInfo {
    SearchModelInfo {
        current: search.current_model(),
        available: search.variants().to_vec(),
    }
}

/// GET /api/v1/backends/health
///
/// Probes every configured backend concurrently.
pub async fn get_health(State(state): State<AppState>) -> ApiResponse<Vec<BackendHealth>> {
    let started = Instant::now();
    let report = state.gateway().health().await;
    ApiResponse::success(report, started)
}

/// GET /api/v1/backends/search/model
pub async fn get_search_model(
    State(state): State<AppState>,
) -> Result<ApiResponse<SearchModelInfo>, AppError> {
    let started = Instant::now();
    let search = search_backend(&state)?;
    Ok(ApiResponse::success(model_info(search), started))
}

/// PUT /api/v1/backends/search/model
pub async fn switch_search_model(
    State(state): State<AppState>,
    Json(body): Json<SwitchSearchModel>,
) -> Result<ApiResponse<SearchModelInfo>, AppError> {
    let started = Instant::now();
    let search = search_backend(&state)?;
    let variant = search.switch_model(&body.model)?;
    tracing::info!(variant = %variant.name, model = %variant.model, "Search variant switched");
    Ok(ApiResponse::success(model_info(search), started))
}
