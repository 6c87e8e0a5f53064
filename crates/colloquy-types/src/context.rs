//! Prompt context types produced by the context builder.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::llm::Message;

/// Dominant language of recent user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Czech,
    English,
    Mixed,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Czech => write!(f, "czech"),
            Language::English => write!(f, "english"),
            Language::Mixed => write!(f, "mixed"),
        }
    }
}

/// System prompt variant selected for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptVariant {
    /// No prior messages in the conversation.
    FirstTime,
    /// One or two prior messages.
    Default,
    /// More than two prior messages.
    Continuing,
    /// Language-focused variant for Czech input.
    CzechFocused,
    /// Language-focused variant for English input.
    EnglishFocused,
}

/// Entities pulled out of a single message.
///
/// Each list holds the raw matched substrings, in match order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedEntities {
    pub dates: Vec<String>,
    pub times: Vec<String>,
    pub people: Vec<String>,
    pub projects: Vec<String>,
    pub tasks: Vec<String>,
    pub organizations: Vec<String>,
}

impl ExtractedEntities {
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
            && self.times.is_empty()
            && self.people.is_empty()
            && self.projects.is_empty()
            && self.tasks.is_empty()
            && self.organizations.is_empty()
    }
}

/// Everything the orchestrator needs to call a backend for one turn.
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub system_prompt: String,
    pub variant: PromptVariant,
    /// Most recent messages, oldest first, capped at the context window.
    pub messages: Vec<Message>,
    pub language: Language,
    pub topics: Vec<String>,
    /// Entities found in the latest user message.
    pub entities: ExtractedEntities,
    /// Messages that preceded the turn being answered.
    pub message_count: usize,
}

impl PromptContext {
    /// System prompt followed by the context window, ready for a backend.
    pub fn to_messages(&self) -> Vec<Message> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        out.push(Message::system(self.system_prompt.clone()));
        out.extend(self.messages.iter().cloned());
        out
    }
}
