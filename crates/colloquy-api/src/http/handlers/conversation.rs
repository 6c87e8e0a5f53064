//! Conversation lifecycle endpoints.

use std::time::Instant;

use axum::extract::{Path, Query, State};
use serde::Serialize;

use colloquy_types::chat::{ConversationSummary, HistoryPage};

use crate::http::error::AppError;
use crate::http::extractors::query::HistoryQuery;
use crate::http::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedConversation {
    pub conversation_id: String,
    pub deleted: bool,
}

/// GET /api/v1/conversations/{id}/history
pub async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<ApiResponse<HistoryPage>, AppError> {
    let started = Instant::now();
    let page = state
        .orchestrator
        .store()
        .history(&id, query.page, query.limit)?;
    Ok(ApiResponse::success(page, started))
}

/// GET /api/v1/conversations/{id}/summary
pub async fn get_summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<ConversationSummary>, AppError> {
    let started = Instant::now();
    let summary = state.orchestrator.store().summarize(&id)?;
    Ok(ApiResponse::success(summary, started))
}

/// DELETE /api/v1/conversations/{id}
///
/// Drops the conversation and every cache entry it produced.
pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<DeletedConversation>, AppError> {
    let started = Instant::now();
    if !state.orchestrator.delete_conversation(&id) {
        return Err(AppError::NotFound(format!("Conversation '{id}' not found")));
    }
    Ok(ApiResponse::success(
        DeletedConversation {
            conversation_id: id,
            deleted: true,
        },
        started,
    ))
}
