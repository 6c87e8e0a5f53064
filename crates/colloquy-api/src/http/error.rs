//! Application error type mapping to HTTP status codes.
//!
//! Cooldown rejections answer with the flat `{error, message, waitTime}`
//! body chat clients expect; everything else uses the error envelope.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use colloquy_core::chat::orchestrator::ChatError;
use colloquy_types::error::ConversationError;
use colloquy_types::llm::{BackendError, ErrorKind};

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    Chat(ChatError),
    Conversation(ConversationError),
    Backend(BackendError),
    /// Request validation failed.
    Validation(String),
    NotFound(String),
    Internal(String),
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::Backend(err) => AppError::Backend(err),
            other => AppError::Chat(other),
        }
    }
}

impl From<ConversationError> for AppError {
    fn from(e: ConversationError) -> Self {
        AppError::Conversation(e)
    }
}

impl From<BackendError> for AppError {
    fn from(e: BackendError) -> Self {
        AppError::Backend(e)
    }
}

/// HTTP status for a classified backend failure.
pub fn backend_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::RateLimited | ErrorKind::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::ModelNotFound => StatusCode::NOT_FOUND,
        ErrorKind::ContextTooLong => StatusCode::PAYLOAD_TOO_LARGE,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::BackendUnreachable | ErrorKind::ModelNotLoaded => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::OutOfMemory | ErrorKind::NetworkError | ErrorKind::GeneralError => {
            StatusCode::BAD_GATEWAY
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            AppError::Chat(ChatError::Cooldown(rejection)) => {
                let body = json!({
                    "error": "Too many requests",
                    "message": format!(
                        "Please wait {} seconds before sending another message.",
                        rejection.wait_secs()
                    ),
                    "waitTime": rejection.wait_secs(),
                });
                return (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
            }
            AppError::Chat(ChatError::InvalidRequest(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR".to_string(), msg.clone(), None)
            }
            AppError::Chat(ChatError::Cancelled) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "CANCELLED".to_string(),
                "The request was cancelled".to_string(),
                None,
            ),
            AppError::Chat(ChatError::Backend(err)) | AppError::Backend(err) => (
                backend_status(err.kind),
                err.kind.to_string(),
                err.user_message(),
                err.original.as_ref().map(|o| json!({ "originalError": o })),
            ),
            AppError::Conversation(ConversationError::NotFound(id)) => (
                StatusCode::NOT_FOUND,
                "CONVERSATION_NOT_FOUND".to_string(),
                format!("Conversation '{id}' not found"),
                None,
            ),
            AppError::Conversation(ConversationError::InvalidArgument(msg)) | AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR".to_string(), msg.clone(), None)
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND".to_string(), msg.clone(), None),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR".to_string(),
                    msg.clone(),
                    None,
                )
            }
        };

        (status, ApiResponse::error(&code, &message, details)).into_response()
    }
}
