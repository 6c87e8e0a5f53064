//! In-memory conversation store.
//!
//! Conversations are created lazily on first reference and live in a sharded
//! `DashMap`. Every mutation of one conversation happens under its shard's
//! write guard, so concurrent appends to the same id are serialized while
//! distinct ids proceed in parallel. Nothing here survives a restart.

use chrono::{DateTime, Duration, Utc};
use colloquy_types::chat::{
    ChatMessage, Conversation, ConversationSummary, HistoryPage, NewMessage, Sender,
};
use colloquy_types::config::ConversationConfig;
use colloquy_types::error::ConversationError;
use colloquy_types::llm::Message;
use dashmap::DashMap;
use uuid::Uuid;

/// Process-wide store of active conversations.
pub struct ConversationStore {
    conversations: DashMap<String, Conversation>,
    /// Raw message bound per conversation (`2 × max_turns`).
    max_messages: usize,
    idle_timeout: Duration,
}

impl ConversationStore {
    pub fn new(config: &ConversationConfig) -> Self {
        Self::with_limits(
            config.max_turns,
            Duration::seconds(config.idle_timeout_secs as i64),
        )
    }

    pub fn with_limits(max_turns: usize, idle_timeout: Duration) -> Self {
        Self {
            conversations: DashMap::new(),
            max_messages: max_turns.saturating_mul(2).max(1),
            idle_timeout,
        }
    }

    /// Reject blank conversation ids.
    pub fn validate_id(id: &str) -> Result<(), ConversationError> {
        if id.trim().is_empty() {
            return Err(ConversationError::InvalidArgument(
                "conversation id must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Return the conversation for `id`, creating it if needed, and refresh
    /// its activity timestamp.
    pub fn get_or_create(&self, id: &str) -> Result<Conversation, ConversationError> {
        Self::validate_id(id)?;
        let mut entry = self
            .conversations
            .entry(id.to_string())
            .or_insert_with(|| {
                tracing::debug!(conversation_id = %id, "Creating conversation");
                Conversation::new(id)
            });
        entry.last_activity = Utc::now();
        Ok(entry.clone())
    }

    /// Append a message, trimming the oldest messages past the bound.
    pub fn append(
        &self,
        id: &str,
        message: NewMessage,
    ) -> Result<Conversation, ConversationError> {
        Self::validate_id(id)?;
        let now = Utc::now();
        let mut entry = self
            .conversations
            .entry(id.to_string())
            .or_insert_with(|| Conversation::new(id));

        entry.messages.push(ChatMessage {
            id: message.id.unwrap_or_else(|| Uuid::now_v7().to_string()),
            sender: message.sender,
            text: message.text,
            timestamp: message.timestamp.unwrap_or(now),
        });

        let len = entry.messages.len();
        if len > self.max_messages {
            let overflow = len - self.max_messages;
            entry.messages.drain(..overflow);
            tracing::debug!(conversation_id = %id, dropped = overflow, "Trimmed conversation");
        }
        entry.last_activity = now;
        Ok(entry.clone())
    }

    /// Snapshot of a conversation without touching its activity timestamp.
    pub fn get(&self, id: &str) -> Option<Conversation> {
        self.conversations.get(id).map(|c| c.clone())
    }

    /// Ordered `{role, content}` list of the non-empty messages of `id`.
    pub fn to_prompt_context(&self, id: &str) -> Vec<Message> {
        let Some(conversation) = self.conversations.get(id) else {
            return Vec::new();
        };
        conversation
            .messages
            .iter()
            .filter(|m| !m.text.is_empty())
            .map(|m| Message {
                role: m.sender.role(),
                content: m.text.clone(),
            })
            .collect()
    }

    pub fn summarize(&self, id: &str) -> Result<ConversationSummary, ConversationError> {
        let conversation = self
            .conversations
            .get(id)
            .ok_or_else(|| ConversationError::NotFound(id.to_string()))?;
        let user_messages = conversation
            .messages
            .iter()
            .filter(|m| m.sender == Sender::User)
            .count();
        let total = conversation.messages.len();
        Ok(ConversationSummary {
            conversation_id: conversation.id.clone(),
            total_messages: total,
            user_messages,
            assistant_messages: total - user_messages,
            created_at: conversation.created_at,
            last_activity: conversation.last_activity,
            duration_seconds: (Utc::now() - conversation.created_at).num_seconds(),
        })
    }

    /// Paged history, most recent window first.
    ///
    /// `page` is 1-based; messages inside a page stay in chronological order.
    pub fn history(
        &self,
        id: &str,
        page: usize,
        limit: usize,
    ) -> Result<HistoryPage, ConversationError> {
        if page == 0 || limit == 0 {
            return Err(ConversationError::InvalidArgument(
                "page and limit must be at least 1".to_string(),
            ));
        }
        let conversation = self
            .conversations
            .get(id)
            .ok_or_else(|| ConversationError::NotFound(id.to_string()))?;

        let total = conversation.messages.len();
        let end = total.saturating_sub((page - 1).saturating_mul(limit));
        let start = end.saturating_sub(limit);
        Ok(HistoryPage {
            conversation_id: id.to_string(),
            messages: conversation.messages[start..end].to_vec(),
            total,
            page,
            limit,
            has_more: start > 0,
        })
    }

    /// Remove a conversation. Returns whether one existed.
    pub fn delete(&self, id: &str) -> bool {
        self.conversations.remove(id).is_some()
    }

    /// Drop conversations idle longer than the configured timeout.
    ///
    /// Returns the number of conversations removed.
    pub fn sweep_idle(&self, now: DateTime<Utc>) -> usize {
        let before = self.conversations.len();
        let idle_timeout = self.idle_timeout;
        self.conversations
            .retain(|_, c| now - c.last_activity <= idle_timeout);
        let removed = before.saturating_sub(self.conversations.len());
        if removed > 0 {
            tracing::info!(removed, "Swept idle conversations");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_types::llm::MessageRole;
    use std::sync::Arc;

    fn store() -> ConversationStore {
        ConversationStore::with_limits(20, Duration::hours(24))
    }

    #[test]
    fn test_empty_id_rejected() {
        let store = store();
        assert!(matches!(
            store.get_or_create(""),
            Err(ConversationError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.append("", NewMessage::user("hi")),
            Err(ConversationError::InvalidArgument(_))
        ));
        assert!(ConversationStore::validate_id("  ").is_err());
        assert!(ConversationStore::validate_id("c1").is_ok());
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let store = store();
        let first = store.get_or_create("c1").unwrap();
        let second = store.get_or_create("c1").unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert!(second.last_activity >= first.last_activity);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_append_assigns_id_and_timestamp() {
        let store = store();
        let conv = store.append("c1", NewMessage::user("hello")).unwrap();
        assert_eq!(conv.messages.len(), 1);
        assert!(!conv.messages[0].id.is_empty());
        assert_eq!(conv.messages[0].sender, Sender::User);
    }

    #[test]
    fn test_append_keeps_supplied_id() {
        let store = store();
        let mut msg = NewMessage::user("hello");
        msg.id = Some("m-1".to_string());
        let conv = store.append("c1", msg).unwrap();
        assert_eq!(conv.messages[0].id, "m-1");
    }

    #[test]
    fn test_trim_drops_oldest_messages() {
        let store = store();
        for i in 0..45 {
            store
                .append("c1", NewMessage::user(format!("message {i}")))
                .unwrap();
        }
        let conv = store.get("c1").unwrap();
        assert_eq!(conv.messages.len(), 40);
        assert_eq!(conv.messages[0].text, "message 5");
        assert_eq!(conv.messages[39].text, "message 44");
    }

    #[test]
    fn test_prompt_context_skips_empty_and_maps_roles() {
        let store = store();
        store.append("c1", NewMessage::user("question")).unwrap();
        store.append("c1", NewMessage::assistant("")).unwrap();
        store.append("c1", NewMessage::assistant("answer")).unwrap();
        let ctx = store.to_prompt_context("c1");
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx[0].role, MessageRole::User);
        assert_eq!(ctx[1].role, MessageRole::Assistant);
        assert_eq!(ctx[1].content, "answer");
        assert!(store.to_prompt_context("missing").is_empty());
    }

    #[test]
    fn test_summarize_counts() {
        let store = store();
        store.append("c1", NewMessage::user("a")).unwrap();
        store.append("c1", NewMessage::assistant("b")).unwrap();
        store.append("c1", NewMessage::user("c")).unwrap();
        let summary = store.summarize("c1").unwrap();
        assert_eq!(summary.total_messages, 3);
        assert_eq!(summary.user_messages, 2);
        assert_eq!(summary.assistant_messages, 1);
        assert!(summary.duration_seconds >= 0);
        assert!(matches!(
            store.summarize("nope"),
            Err(ConversationError::NotFound(_))
        ));
    }

    #[test]
    fn test_history_pages_from_most_recent() {
        let store = store();
        for i in 0..5 {
            store.append("c1", NewMessage::user(format!("m{i}"))).unwrap();
        }
        let page1 = store.history("c1", 1, 2).unwrap();
        let texts: Vec<&str> = page1.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["m3", "m4"]);
        assert!(page1.has_more);

        let page3 = store.history("c1", 3, 2).unwrap();
        let texts: Vec<&str> = page3.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["m0"]);
        assert!(!page3.has_more);

        let page9 = store.history("c1", 9, 2).unwrap();
        assert!(page9.messages.is_empty());
        assert_eq!(page9.total, 5);
    }

    #[test]
    fn test_history_rejects_zero_page() {
        let store = store();
        store.append("c1", NewMessage::user("x")).unwrap();
        assert!(matches!(
            store.history("c1", 0, 10),
            Err(ConversationError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_delete() {
        let store = store();
        store.append("c1", NewMessage::user("x")).unwrap();
        assert!(store.delete("c1"));
        assert!(!store.delete("c1"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_sweep_removes_only_idle() {
        let store = store();
        store.append("old", NewMessage::user("x")).unwrap();
        store.append("fresh", NewMessage::user("y")).unwrap();
        let later = Utc::now() + Duration::hours(25);
        // Touch "fresh" as if it were active just before the sweep.
        store
            .conversations
            .get_mut("fresh")
            .unwrap()
            .last_activity = later;
        let removed = store.sweep_idle(later);
        assert_eq!(removed, 1);
        assert!(store.get("old").is_none());
        assert!(store.get("fresh").is_some());
    }

    #[test]
    fn test_concurrent_appends_are_serialized() {
        let store = Arc::new(store());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..5 {
                        store
                            .append("shared", NewMessage::user(format!("{t}-{i}")))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.get("shared").unwrap().messages.len(), 40);
    }
}
