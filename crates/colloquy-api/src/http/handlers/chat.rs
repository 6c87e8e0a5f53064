//! Chat endpoints.
//!
//! POST /api/v1/chat answers with a single `ChatReply`. POST
//! /api/v1/chat/stream answers with Server-Sent Events, one `data:` frame
//! per [`ChatEvent`]:
//! - `{"type":"chunk","content":"..."}` for each text fragment
//! - `{"type":"done","fullText":"...",...}` on success
//! - `{"type":"error","errorType":"...","message":"..."}` on failure
//!
//! Cooldown rejections and blank messages are answered with a plain status
//! before any stream starts.

use std::convert::Infallible;

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use colloquy_core::chat::orchestrator::TurnRequest;
use colloquy_types::chat::{ChatReply, ChatRequest};

use crate::http::error::AppError;
use crate::http::extractors::client::ClientId;
use crate::state::AppState;

pub const CONVERSATION_ID_HEADER: &str = "x-conversation-id";

/// Conversation id for callers that did not send one:
/// `conv_<unix-millis>_<8 hex>`.
pub fn mint_conversation_id() -> String {
    format!(
        "conv_{}_{:08x}",
        chrono::Utc::now().timestamp_millis(),
        rand::random::<u32>()
    )
}

fn turn_request(body: ChatRequest, client: ClientId) -> TurnRequest {
    let conversation_id = body
        .conversation_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(mint_conversation_id);
    TurnRequest {
        conversation_id,
        message: body.message,
        model: body.model,
        client_id: client.0,
    }
}

/// POST /api/v1/chat
pub async fn chat(
    State(state): State<AppState>,
    client: ClientId,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatReply>, AppError> {
    let turn = turn_request(body, client);
    let reply = state
        .orchestrator
        .respond(turn, CancellationToken::new())
        .await?;
    Ok(Json(reply))
}

/// POST /api/v1/chat/stream
///
/// The turn is cancelled when the client goes away: the drop guard lives
/// inside the response body stream.
pub async fn stream_chat(
    State(state): State<AppState>,
    client: ClientId,
    Json(body): Json<ChatRequest>,
) -> Result<impl IntoResponse, AppError> {
    let turn = turn_request(body, client);
    let conversation_id = turn.conversation_id.clone();

    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let mut events = state.orchestrator.stream(turn, cancel)?;

    let frames = async_stream::stream! {
        let _guard = guard;
        while let Some(event) = events.next().await {
            match Event::default().json_data(&event) {
                Ok(frame) => yield Ok::<Event, Infallible>(frame),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode chat event");
                    break;
                }
            }
        }
    };

    Ok((
        [(CONVERSATION_ID_HEADER, conversation_id)],
        Sse::new(frames).keep_alive(KeepAlive::default()),
    ))
}
