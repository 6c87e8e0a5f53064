//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/` except `/health`.
//! Middleware: CORS, tracing.

use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([axum::http::HeaderName::from_static(
            handlers::chat::CONVERSATION_ID_HEADER,
        )]);

    let api_routes = Router::new()
        // Chat
        .route("/chat", post(handlers::chat::chat))
        .route("/chat/stream", post(handlers::chat::stream_chat))
        // Conversations
        .route(
            "/conversations/{id}/history",
            get(handlers::conversation::get_history),
        )
        .route(
            "/conversations/{id}/summary",
            get(handlers::conversation::get_summary),
        )
        .route(
            "/conversations/{id}",
            delete(handlers::conversation::delete_conversation),
        )
        // Backends
        .route("/backends/health", get(handlers::backends::get_health))
        .route(
            "/backends/search/model",
            get(handlers::backends::get_search_model).put(handlers::backends::switch_search_model),
        )
        // Cache
        .route("/cache/stats", get(handlers::cache::get_stats));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - liveness probe.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
