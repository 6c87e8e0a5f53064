//! SSE decoding for OpenAI-compatible chat completions.
//!
//! Each `data:` frame carries a chunk object whose `choices[].delta.content`
//! fragments are concatenated into one text chunk. `data: [DONE]` ends the
//! stream. Hosted routers may report a failure mid-stream as a frame with a
//! top-level `error` object; that is classified like an HTTP error.

use eventsource_stream::{EventStreamError, Eventsource};
use futures_util::StreamExt;
use serde::Deserialize;

use colloquy_core::llm::backend::BackendStream;
use colloquy_types::llm::BackendError;

use super::super::http::{StatusClassifier, classify_transport, ensure_success};

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    message: String,
}

/// One decoded SSE frame.
#[derive(Debug, PartialEq)]
pub enum Frame {
    Text(String),
    Done,
}

/// Decode the `data` of one SSE event.
pub fn parse_frame(data: &str, classify: StatusClassifier) -> Result<Frame, BackendError> {
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(Frame::Done);
    }

    let payload: ChunkPayload = serde_json::from_str(data)
        .map_err(|e| BackendError::general(format!("malformed stream frame: {e}")))?;

    if let Some(err) = payload.error {
        let status = err
            .code
            .as_ref()
            .and_then(|c| c.as_u64().or_else(|| c.as_str().and_then(|s| s.parse().ok())))
            .and_then(|c| u16::try_from(c).ok())
            .unwrap_or(500);
        return Err(classify(status, &err.message, None));
    }

    let text = payload
        .choices
        .into_iter()
        .filter_map(|c| c.delta.and_then(|d| d.content))
        .collect::<String>();
    Ok(Frame::Text(text))
}

/// Send `request` and decode its SSE body into text chunks.
///
/// Dropping the returned stream drops the response body, which closes the
/// connection.
pub fn text_stream(request: reqwest::RequestBuilder, classify: StatusClassifier) -> BackendStream {
    Box::pin(async_stream::try_stream! {
        let response = request.send().await.map_err(|e| classify_transport(&e))?;
        let response = ensure_success(response, classify).await?;
        let mut events = response.bytes_stream().eventsource();

        while let Some(event) = events.next().await {
            let event = event.map_err(map_event_error)?;
            match parse_frame(&event.data, classify)? {
                Frame::Done => break,
                Frame::Text(text) if text.is_empty() => continue,
                Frame::Text(text) => yield text,
            }
        }
    })
}

fn map_event_error(err: EventStreamError<reqwest::Error>) -> BackendError {
    match err {
        EventStreamError::Transport(e) => classify_transport(&e),
        other => BackendError::general(format!("invalid event stream: {other}")),
    }
}
