//! Push-stream events emitted by the chat orchestrator.
//!
//! Every request produces zero or more `Chunk` events followed by exactly one
//! terminal event, either `Done` or `Error`. The JSON shape of each variant is
//! the SSE frame payload delivered to HTTP clients.

use serde::{Deserialize, Serialize};

use crate::llm::{BackendError, ErrorKind};

/// A single item of the chat push stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// Incremental text fragment.
    Chunk { content: String },

    /// Successful completion carrying the accumulated text.
    Done {
        #[serde(rename = "fullText")]
        full_text: String,
        #[serde(rename = "modelUsed", skip_serializing_if = "Option::is_none", default)]
        model_used: Option<String>,
        #[serde(
            rename = "processingTime",
            skip_serializing_if = "Option::is_none",
            default
        )]
        processing_time: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        service: Option<String>,
        #[serde(rename = "fromCache", skip_serializing_if = "is_false", default)]
        from_cache: bool,
    },

    /// Terminal failure, classified into the closed error taxonomy.
    Error {
        #[serde(rename = "errorType")]
        error_type: ErrorKind,
        message: String,
        #[serde(
            rename = "originalError",
            skip_serializing_if = "Option::is_none",
            default
        )]
        original_error: Option<String>,
    },
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl ChatEvent {
    pub fn chunk(content: impl Into<String>) -> Self {
        ChatEvent::Chunk {
            content: content.into(),
        }
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChatEvent::Chunk { .. })
    }
}

impl From<&BackendError> for ChatEvent {
    fn from(err: &BackendError) -> Self {
        ChatEvent::Error {
            error_type: err.kind,
            message: err.user_message(),
            original_error: err.original.clone().or_else(|| Some(err.message.clone())),
        }
    }
}
