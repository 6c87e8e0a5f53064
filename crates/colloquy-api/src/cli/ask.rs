//! One-shot chat from the terminal.
//!
//! Runs a single turn through the same orchestrator the HTTP layer uses and
//! prints chunks as they arrive. Ctrl+C cancels the turn.

use std::io::Write;

use anyhow::{Result, bail};
use console::style;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use colloquy_core::chat::orchestrator::TurnRequest;
use colloquy_types::event::ChatEvent;

use crate::http::handlers::chat::mint_conversation_id;
use crate::state::AppState;

const CLI_CLIENT_ID: &str = "cli";

pub async fn ask(
    state: &AppState,
    message: String,
    model: Option<String>,
    conversation: Option<String>,
    json: bool,
) -> Result<()> {
    let conversation_id = conversation.unwrap_or_else(mint_conversation_id);
    let cancel = CancellationToken::new();
    let request = TurnRequest {
        conversation_id: conversation_id.clone(),
        message,
        model,
        client_id: CLI_CLIENT_ID.to_string(),
    };

    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let outcome = if json {
        respond_json(state, request, cancel).await
    } else {
        stream_to_terminal(state, request, cancel, &conversation_id).await
    };

    ctrl_c.abort();
    outcome
}

async fn respond_json(state: &AppState, request: TurnRequest, cancel: CancellationToken) -> Result<()> {
    let reply = state.orchestrator.respond(request, cancel).await?;
    println!("{}", serde_json::to_string_pretty(&reply)?);
    Ok(())
}

async fn stream_to_terminal(
    state: &AppState,
    request: TurnRequest,
    cancel: CancellationToken,
    conversation_id: &str,
) -> Result<()> {
    let mut events = state.orchestrator.stream(request, cancel.clone())?;
    let mut stdout = std::io::stdout();

    println!();
    while let Some(event) = events.next().await {
        match event {
            ChatEvent::Chunk { content } => {
                print!("{content}");
                stdout.flush()?;
            }
            ChatEvent::Done {
                model_used,
                service,
                processing_time,
                from_cache,
                ..
            } => {
                println!();
                println!();
                let source = if from_cache {
                    "cache".to_string()
                } else {
                    format!(
                        "{} / {}",
                        service.as_deref().unwrap_or("-"),
                        model_used.as_deref().unwrap_or("-")
                    )
                };
                println!(
                    "  {}",
                    style(format!(
                        "{source} in {} ms, conversation {conversation_id}",
                        processing_time.unwrap_or_default()
                    ))
                    .dim()
                );
                return Ok(());
            }
            ChatEvent::Error {
                error_type,
                message,
                original_error,
            } => {
                println!();
                eprintln!("  {} {message}", style(format!("[{error_type}]")).red().bold());
                if let Some(original) = original_error {
                    tracing::debug!(%original, "Backend error detail");
                }
                bail!("chat turn failed: {error_type}");
            }
        }
    }

    if cancel.is_cancelled() {
        println!();
        println!("  {}", style("Cancelled.").dim());
    }
    Ok(())
}
