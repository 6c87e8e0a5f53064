//! System prompt selection and context window assembly.
//!
//! Prompt choice is fully deterministic: the variant depends only on how many
//! messages preceded the current turn and on the dominant language of the
//! last three user messages. Topic and entity notes are appended after it.

use std::sync::Arc;

use colloquy_types::chat::{Conversation, Sender};
use colloquy_types::config::ConversationConfig;
use colloquy_types::context::{ExtractedEntities, Language, PromptContext, PromptVariant};

use super::entities::extract_entities;
use super::language::detect_language;
use super::topics::extract_topics;
use crate::conversation::store::ConversationStore;

/// User messages considered for language detection.
const LANGUAGE_WINDOW: usize = 3;

/// Above this many prior messages the prompt carries a running count.
const COUNT_NOTE_THRESHOLD: usize = 5;

fn base_prompt(variant: PromptVariant) -> &'static str {
    match variant {
        PromptVariant::FirstTime => {
            "You are Colloquy, a friendly and helpful assistant. This is the start of a new \
             conversation: greet the user briefly, then help with their request."
        }
        PromptVariant::Default => {
            "You are Colloquy, a helpful assistant. Answer clearly and concisely."
        }
        PromptVariant::Continuing => {
            "You are Colloquy, a helpful assistant continuing an ongoing conversation. Keep \
             the earlier context in mind and do not repeat yourself."
        }
        PromptVariant::CzechFocused => {
            "Jsi Colloquy, užitečný asistent. Odpovídej česky, jasně a stručně, a navazuj na \
             předchozí konverzaci."
        }
        PromptVariant::EnglishFocused => {
            "You are Colloquy, a helpful assistant. Respond in English, clearly and concisely, \
             building on the conversation so far."
        }
    }
}

/// Pick the prompt variant for a turn.
pub fn select_variant(message_count: usize, language: Language) -> PromptVariant {
    if message_count == 0 {
        return PromptVariant::FirstTime;
    }
    match language {
        Language::Czech => PromptVariant::CzechFocused,
        Language::English => PromptVariant::EnglishFocused,
        Language::Mixed if message_count > 2 => PromptVariant::Continuing,
        Language::Mixed => PromptVariant::Default,
    }
}

/// One line listing the entity groups that matched, or `None`.
fn entity_note(entities: &ExtractedEntities) -> Option<String> {
    let groups = [
        ("dates", &entities.dates),
        ("times", &entities.times),
        ("people", &entities.people),
        ("projects", &entities.projects),
        ("tasks", &entities.tasks),
        ("organizations", &entities.organizations),
    ];
    let parts: Vec<String> = groups
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(label, values)| format!("{label}: {}", values.join(", ")))
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(format!("The latest message mentions {}.", parts.join("; ")))
}

/// Render the full system prompt for a turn.
pub fn compose_system_prompt(
    message_count: usize,
    language: Language,
    topics: &[String],
    entities: &ExtractedEntities,
) -> (String, PromptVariant) {
    let variant = select_variant(message_count, language);
    let mut prompt = base_prompt(variant).to_string();
    if !topics.is_empty() {
        prompt.push_str(&format!("\n\nTopics discussed so far: {}.", topics.join(", ")));
    }
    if let Some(note) = entity_note(entities) {
        prompt.push_str("\n\n");
        prompt.push_str(&note);
    }
    if message_count > COUNT_NOTE_THRESHOLD {
        prompt.push_str(&format!(
            "\n\nThis conversation already has {message_count} messages."
        ));
    }
    (prompt, variant)
}

/// Number of messages that came before the turn being answered.
///
/// A trailing user message is the pending turn itself and is not counted.
fn prior_message_count(conversation: &Conversation) -> usize {
    let len = conversation.messages.len();
    match conversation.messages.last() {
        Some(last) if last.sender == Sender::User => len - 1,
        _ => len,
    }
}

/// Builds the per-turn prompt context from the conversation store.
pub struct ContextBuilder {
    store: Arc<ConversationStore>,
    context_messages: usize,
}

impl ContextBuilder {
    pub fn new(store: Arc<ConversationStore>, config: &ConversationConfig) -> Self {
        Self {
            store,
            context_messages: config.context_messages.max(1),
        }
    }

    /// System prompt for the conversation's next turn.
    pub fn build_system_prompt(&self, conversation_id: &str) -> String {
        self.build(conversation_id).system_prompt
    }

    /// Everything needed for one backend call: system prompt, trimmed
    /// context window, language, topics and entities.
    pub fn build(&self, conversation_id: &str) -> PromptContext {
        let conversation = self.store.get(conversation_id);
        let (message_count, user_texts) = match &conversation {
            Some(c) => (
                prior_message_count(c),
                c.messages
                    .iter()
                    .filter(|m| m.sender == Sender::User)
                    .map(|m| m.text.clone())
                    .collect::<Vec<_>>(),
            ),
            None => (0, Vec::new()),
        };

        let recent_start = user_texts.len().saturating_sub(LANGUAGE_WINDOW);
        let language = detect_language(&user_texts[recent_start..]);
        let topics = extract_topics(&user_texts);
        let entities = user_texts
            .last()
            .map(|text| extract_entities(text))
            .unwrap_or_else(ExtractedEntities::default);
        let (system_prompt, variant) = compose_system_prompt(message_count, language, &topics, &entities);

        let mut messages = self.store.to_prompt_context(conversation_id);
        if messages.len() > self.context_messages {
            messages.drain(..messages.len() - self.context_messages);
        }

        tracing::debug!(
            conversation_id,
            ?variant,
            %language,
            message_count,
            topics = topics.len(),
            "Built prompt context"
        );

        PromptContext {
            system_prompt,
            variant,
            messages,
            language,
            topics,
            entities,
            message_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use colloquy_types::chat::NewMessage;

    fn builder() -> (Arc<ConversationStore>, ContextBuilder) {
        let store = Arc::new(ConversationStore::with_limits(20, Duration::hours(24)));
        let builder = ContextBuilder::new(Arc::clone(&store), &ConversationConfig::default());
        (store, builder)
    }

    #[test]
    fn test_variant_selection_table() {
        assert_eq!(select_variant(0, Language::Czech), PromptVariant::FirstTime);
        assert_eq!(select_variant(1, Language::Mixed), PromptVariant::Default);
        assert_eq!(select_variant(2, Language::Mixed), PromptVariant::Default);
        assert_eq!(select_variant(3, Language::Mixed), PromptVariant::Continuing);
        assert_eq!(select_variant(1, Language::Czech), PromptVariant::CzechFocused);
        assert_eq!(select_variant(7, Language::English), PromptVariant::EnglishFocused);
    }

    #[test]
    fn test_first_turn_uses_first_time_prompt() {
        let (store, builder) = builder();
        store
            .append("c1", NewMessage::user("Could you explain closures please?"))
            .unwrap();
        let ctx = builder.build("c1");
        assert_eq!(ctx.variant, PromptVariant::FirstTime);
        assert_eq!(ctx.message_count, 0);
        assert_eq!(ctx.messages.len(), 1);
    }

    #[test]
    fn test_unknown_conversation_is_first_time() {
        let (_store, builder) = builder();
        let ctx = builder.build("nope");
        assert_eq!(ctx.variant, PromptVariant::FirstTime);
        assert!(ctx.messages.is_empty());
        assert_eq!(ctx.language, Language::Mixed);
    }

    #[test]
    fn test_language_override_after_first_turn() {
        let (store, builder) = builder();
        store.append("c1", NewMessage::user("Ahoj, jak se máš?")).unwrap();
        store.append("c1", NewMessage::assistant("Mám se dobře.")).unwrap();
        store
            .append("c1", NewMessage::user("Potřebuji pomoc s projektem, prosím."))
            .unwrap();
        let ctx = builder.build("c1");
        assert_eq!(ctx.message_count, 2);
        assert_eq!(ctx.language, Language::Czech);
        assert_eq!(ctx.variant, PromptVariant::CzechFocused);
        assert!(ctx.system_prompt.starts_with("Jsi Colloquy"));
    }

    #[test]
    fn test_prompt_includes_topics_and_count_note() {
        let none = ExtractedEntities::default();
        let (prompt, _) = compose_system_prompt(6, Language::Mixed, &["work".to_string()], &none);
        assert!(prompt.contains("Topics discussed so far: work."));
        assert!(prompt.contains("already has 6 messages"));

        let (prompt, _) = compose_system_prompt(5, Language::Mixed, &[], &none);
        assert!(!prompt.contains("mentions"));
        assert!(!prompt.contains("Topics"));
        assert!(!prompt.contains("messages."));
    }

    #[test]
    fn test_context_window_keeps_most_recent() {
        let store = Arc::new(ConversationStore::with_limits(20, Duration::hours(24)));
        let config = ConversationConfig {
            context_messages: 3,
            ..ConversationConfig::default()
        };
        let builder = ContextBuilder::new(Arc::clone(&store), &config);
        for i in 0..6 {
            store.append("c1", NewMessage::user(format!("m{i}"))).unwrap();
        }
        let ctx = builder.build("c1");
        let texts: Vec<&str> = ctx.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, vec!["m3", "m4", "m5"]);
    }

    #[test]
    fn test_entities_from_latest_user_message() {
        let (store, builder) = builder();
        store.append("c1", NewMessage::user("hello")).unwrap();
        store
            .append("c1", NewMessage::user("meeting tomorrow at 10:00"))
            .unwrap();
        let ctx = builder.build("c1");
        assert_eq!(ctx.entities.dates, vec!["tomorrow"]);
        assert_eq!(ctx.entities.times, vec!["10:00"]);
        assert_eq!(ctx.topics, vec!["work"]);
        assert!(
            ctx.system_prompt
                .contains("The latest message mentions dates: tomorrow; times: 10:00.")
        );
    }

    #[test]
    fn test_entity_note_skips_empty_groups() {
        let entities = ExtractedEntities {
            people: vec!["Jan".to_string()],
            ..ExtractedEntities::default()
        };
        assert_eq!(
            entity_note(&entities).as_deref(),
            Some("The latest message mentions people: Jan.")
        );
        assert_eq!(entity_note(&ExtractedEntities::default()), None);
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let (store, builder) = builder();
        store.append("c1", NewMessage::user("Tell me about hotels")).unwrap();
        let a = builder.build_system_prompt("c1");
        let b = builder.build_system_prompt("c1");
        assert_eq!(a, b);
    }
}
