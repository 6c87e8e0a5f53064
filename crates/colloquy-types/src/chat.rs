//! Conversation and message types for Colloquy.
//!
//! A conversation is keyed by a caller-supplied id and holds the ordered
//! user/assistant exchange plus activity timestamps. These records live only
//! in memory; nothing here is persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::llm::MessageRole;

/// Who authored a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    /// Prompt role for this sender.
    pub fn role(&self) -> MessageRole {
        match self {
            Sender::User => MessageRole::User,
            Sender::Assistant => MessageRole::Assistant,
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for Sender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Sender::User),
            "assistant" => Ok(Sender::Assistant),
            other => Err(format!("invalid sender: '{other}'")),
        }
    }
}

/// A message as stored in a conversation. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// A message about to be appended.
///
/// `id` and `timestamp` are assigned by the store when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    #[serde(default)]
    pub id: Option<String>,
    pub sender: Sender,
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: None,
            sender: Sender::User,
            text: text.into(),
            timestamp: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            id: None,
            sender: Sender::Assistant,
            text: text.into(),
            timestamp: None,
        }
    }
}

/// Server-side conversation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Conversation {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            messages: Vec::new(),
            created_at: now,
            last_activity: now,
        }
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// The last `n` user messages, oldest first.
    pub fn recent_user_messages(&self, n: usize) -> Vec<&ChatMessage> {
        let mut recent: Vec<&ChatMessage> = self
            .messages
            .iter()
            .rev()
            .filter(|m| m.sender == Sender::User)
            .take(n)
            .collect();
        recent.reverse();
        recent
    }
}

/// Counts and timing for one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub total_messages: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub duration_seconds: i64,
}

/// One page of conversation history. Page 1 is the most recent window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub conversation_id: String,
    pub messages: Vec<ChatMessage>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub has_more: bool,
}

/// Inbound chat request from the controller layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Single-object reply for non-streaming callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub conversation_id: String,
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub from_cache: bool,
    pub processing_time: u64,
}
