//! Stream orchestrator: the composition root of one chat turn.
//!
//! A turn runs: cooldown check, user message append, context build, cache
//! lookup, then (on a miss) backend routing and streaming. Chunks are relayed
//! as they arrive. The assistant message and the cache entry are written only
//! after the backend stream completes successfully, so a failed or cancelled
//! turn leaves nothing behind except the user message.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use colloquy_types::chat::{ChatReply, NewMessage};
use colloquy_types::event::ChatEvent;
use colloquy_types::llm::{BackendError, ErrorKind, GenerateOptions};

use super::state::{RequestState, RequestTracker};
use crate::cache::response::ResponseCache;
use crate::context::builder::ContextBuilder;
use crate::conversation::store::ConversationStore;
use crate::llm::gateway::{AUTO, ProviderGateway};
use crate::rate_limit::{CooldownRejection, RateLimiter};

/// Push stream of one turn: chunks, then exactly one `Done` or `Error`.
pub type ChatStream = Pin<Box<dyn Stream<Item = ChatEvent> + Send + 'static>>;

/// Service name reported for responses served from the cache.
const CACHE_SERVICE: &str = "cache";

/// One inbound chat turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub conversation_id: String,
    pub message: String,
    /// Model hint; `None` means `auto`.
    pub model: Option<String>,
    /// Identity used for the cooldown gate.
    pub client_id: String,
}

/// Why a turn could not be served.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChatError {
    #[error(transparent)]
    Cooldown(#[from] CooldownRejection),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("request cancelled")]
    Cancelled,
}

enum Step {
    Cancelled,
    Item(Option<Result<String, BackendError>>),
}

/// Coordinates the stores, the cache, the cooldown gate and the gateway for
/// every chat turn.
#[derive(Clone)]
pub struct ChatOrchestrator {
    store: Arc<ConversationStore>,
    cache: Arc<ResponseCache>,
    limiter: Arc<RateLimiter>,
    context: Arc<ContextBuilder>,
    gateway: Arc<ProviderGateway>,
}

impl ChatOrchestrator {
    pub fn new(
        store: Arc<ConversationStore>,
        cache: Arc<ResponseCache>,
        limiter: Arc<RateLimiter>,
        context: Arc<ContextBuilder>,
        gateway: Arc<ProviderGateway>,
    ) -> Self {
        Self {
            store,
            cache,
            limiter,
            context,
            gateway,
        }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn gateway(&self) -> &Arc<ProviderGateway> {
        &self.gateway
    }

    /// Admit a turn and return its event stream.
    ///
    /// Cooldown rejections and invalid input are returned before any stream
    /// exists so the caller can answer with a plain status code. Once a
    /// stream is returned, every outcome (including backend failures) is
    /// reported through it.
    pub fn stream(
        &self,
        request: TurnRequest,
        cancel: CancellationToken,
    ) -> Result<ChatStream, ChatError> {
        let mut tracker = RequestTracker::new(&request.conversation_id);
        tracker.advance(RequestState::CooldownCheck);

        if request.message.trim().is_empty() {
            tracker.advance(RequestState::Rejected);
            return Err(ChatError::InvalidRequest(
                "message must not be empty".to_string(),
            ));
        }
        ConversationStore::validate_id(&request.conversation_id).map_err(|e| {
            tracker.advance(RequestState::Rejected);
            ChatError::InvalidRequest(e.to_string())
        })?;
        if let Err(rejection) = self.limiter.check(&request.client_id) {
            tracker.advance(RequestState::Rejected);
            return Err(rejection.into());
        }

        self.store
            .append(&request.conversation_id, NewMessage::user(&request.message))
            .map_err(|e| ChatError::InvalidRequest(e.to_string()))?;
        tracker.advance(RequestState::ContextBuild);

        let this = self.clone();
        Ok(Box::pin(this.run_turn(request, tracker, cancel)))
    }

    fn run_turn(
        self,
        request: TurnRequest,
        mut tracker: RequestTracker,
        cancel: CancellationToken,
    ) -> impl Stream<Item = ChatEvent> + Send + 'static {
        async_stream::stream! {
            let started = Instant::now();
            let conversation_id = request.conversation_id;
            let hint = request.model.filter(|m| !m.trim().is_empty()).unwrap_or_else(|| AUTO.to_string());

            let ctx = self.context.build(&conversation_id);
            tracker.advance(RequestState::CacheLookup);

            if let Some(hit) = self.cache.lookup(&ctx.messages, &hint) {
                tracker.advance(RequestState::CacheHit);
                tracing::info!(conversation_id = %conversation_id, hit_count = hit.hit_count, fuzzy = hit.fuzzy, "Serving cached response");
                if let Err(e) = self.store.append(&conversation_id, NewMessage::assistant(&hit.response)) {
                    tracing::warn!(conversation_id = %conversation_id, error = %e, "Failed to record cached response");
                }
                tracker.advance(RequestState::EmitCached);
                yield ChatEvent::chunk(hit.response.clone());
                tracker.advance(RequestState::Done);
                yield ChatEvent::Done {
                    full_text: hit.response,
                    model_used: None,
                    processing_time: Some(started.elapsed().as_millis() as u64),
                    service: Some(CACHE_SERVICE.to_string()),
                    from_cache: true,
                };
                return;
            }
            tracker.advance(RequestState::CacheMiss);
            tracker.advance(RequestState::ProviderCall);

            let routes = match self.gateway.resolve(&hint) {
                Ok(routes) => routes,
                Err(err) => {
                    tracing::error!(conversation_id = %conversation_id, model = %hint, error_kind = %err.kind, "Model hint could not be resolved");
                    tracker.advance(RequestState::TerminalError);
                    tracker.advance(RequestState::Done);
                    yield ChatEvent::from(&err);
                    return;
                }
            };

            let prompt = ctx.to_messages();
            let route_count = routes.len();
            let mut last_error: Option<BackendError> = None;

            'routes: for (index, route) in routes.into_iter().enumerate() {
                let backend = &route.backend;
                let policy = backend.retry_policy();
                let mut attempt: u32 = 0;

                loop {
                    let options = GenerateOptions {
                        model: route.model.clone(),
                        ..Default::default()
                    };
                    tracing::debug!(conversation_id = %conversation_id, backend = backend.name(), attempt, "Calling backend");
                    let mut upstream = backend.generate_stream(prompt.clone(), options);
                    let mut full_text = String::new();
                    let mut streaming = false;

                    let outcome: Result<(), BackendError> = loop {
                        let step = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => Step::Cancelled,
                            item = upstream.next() => Step::Item(item),
                        };
                        match step {
                            Step::Cancelled => {
                                tracing::info!(conversation_id = %conversation_id, backend = backend.name(), "Turn cancelled by caller");
                                return;
                            }
                            Step::Item(Some(Ok(chunk))) => {
                                if chunk.is_empty() {
                                    continue;
                                }
                                if !streaming {
                                    streaming = true;
                                    tracker.advance(RequestState::Streaming);
                                }
                                full_text.push_str(&chunk);
                                yield ChatEvent::Chunk { content: chunk };
                            }
                            Step::Item(Some(Err(err))) => break Err(err),
                            Step::Item(None) if full_text.is_empty() => {
                                break Err(BackendError::general("backend returned an empty response"));
                            }
                            Step::Item(None) => break Ok(()),
                        }
                    };
                    drop(upstream);

                    let err = match outcome {
                        Ok(()) => {
                            if let Err(e) = self.store.append(&conversation_id, NewMessage::assistant(&full_text)) {
                                tracing::warn!(conversation_id = %conversation_id, error = %e, "Failed to record assistant message");
                            }
                            self.cache.set_scoped(&ctx.messages, &full_text, &hint, &conversation_id);
                            let elapsed = started.elapsed().as_millis() as u64;
                            tracing::info!(
                                conversation_id = %conversation_id,
                                backend = backend.name(),
                                processing_ms = elapsed,
                                chars = full_text.len(),
                                "Turn completed"
                            );
                            tracker.advance(RequestState::Done);
                            yield ChatEvent::Done {
                                full_text,
                                model_used: Some(route.model_name()),
                                processing_time: Some(elapsed),
                                service: Some(backend.kind().to_string()),
                                from_cache: false,
                            };
                            return;
                        }
                        Err(err) => err,
                    };

                    let retryable = !streaming && err.kind.is_retryable();
                    let retry_delay = retryable
                        .then(|| policy.next_delay(attempt, err.retry_after_ms))
                        .flatten();
                    if retryable && retry_delay.is_none() && policy.allows(attempt) {
                        tracing::warn!(
                            conversation_id = %conversation_id,
                            backend = backend.name(),
                            retry_after_ms = err.retry_after_ms,
                            max_delay_ms = policy.max_delay.as_millis() as u64,
                            "Server wait hint exceeds the retry cap, not retrying"
                        );
                    }
                    if let Some(delay) = retry_delay {
                        attempt += 1;
                        tracker.advance(RequestState::RetryableError);
                        tracing::warn!(
                            conversation_id = %conversation_id,
                            backend = backend.name(),
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error_kind = %err.kind,
                            "Backend rate limited, backing off"
                        );
                        let cancelled = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => true,
                            _ = tokio::time::sleep(delay) => false,
                        };
                        if cancelled {
                            tracing::info!(conversation_id = %conversation_id, "Turn cancelled during backoff");
                            return;
                        }
                        tracker.advance(RequestState::ProviderCall);
                        continue;
                    }

                    if !streaming && err.kind.allows_failover() && index + 1 < route_count {
                        tracing::warn!(
                            conversation_id = %conversation_id,
                            backend = backend.name(),
                            error_kind = %err.kind,
                            "Backend unreachable, trying next in priority order"
                        );
                        tracker.advance(RequestState::ProviderCall);
                        last_error = Some(err);
                        continue 'routes;
                    }

                    tracing::error!(
                        conversation_id = %conversation_id,
                        backend = backend.name(),
                        attempt,
                        error_kind = %err.kind,
                        error = %err,
                        "Turn failed"
                    );
                    tracker.advance(RequestState::TerminalError);
                    tracker.advance(RequestState::Done);
                    yield ChatEvent::from(&err);
                    return;
                }
            }

            let err = last_error.unwrap_or_else(|| BackendError::unreachable("no backend could serve the request"));
            tracker.advance(RequestState::TerminalError);
            tracker.advance(RequestState::Done);
            yield ChatEvent::from(&err);
        }
    }

    /// Non-streaming variant: drains the turn's events into one reply.
    pub async fn respond(
        &self,
        request: TurnRequest,
        cancel: CancellationToken,
    ) -> Result<ChatReply, ChatError> {
        let conversation_id = request.conversation_id.clone();
        let mut events = self.stream(request, cancel)?;
        while let Some(event) = events.next().await {
            match event {
                ChatEvent::Chunk { .. } => {}
                ChatEvent::Done {
                    full_text,
                    model_used,
                    processing_time,
                    service,
                    from_cache,
                } => {
                    return Ok(ChatReply {
                        conversation_id,
                        response: full_text,
                        model_used,
                        service,
                        from_cache,
                        processing_time: processing_time.unwrap_or_default(),
                    });
                }
                ChatEvent::Error {
                    error_type,
                    message,
                    original_error,
                } => {
                    let mut err = BackendError::new(error_type, message);
                    err.original = original_error;
                    return Err(ChatError::Backend(err));
                }
            }
        }
        Err(ChatError::Cancelled)
    }

    /// Remove a conversation and every cache entry it produced.
    pub fn delete_conversation(&self, conversation_id: &str) -> bool {
        let existed = self.store.delete(conversation_id);
        let dropped = self.cache.invalidate_scope(conversation_id);
        tracing::info!(conversation_id, existed, cache_entries = dropped, "Conversation deleted");
        existed
    }
}

impl ChatError {
    /// Error kind for backend failures, if any.
    pub fn backend_kind(&self) -> Option<ErrorKind> {
        match self {
            ChatError::Backend(err) => Some(err.kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use colloquy_types::chat::Sender;
    use colloquy_types::config::{CacheConfig, CacheLookupPolicy, ConversationConfig};
    use colloquy_types::llm::{BackendKind, MessageRole};

    use crate::llm::box_backend::BoxChatBackend;
    use crate::llm::retry::RetryPolicy;
    use crate::llm::testing::{ScriptedBackend, Step as Script, chunks, fail};

    fn orchestrator_with(
        backends: Vec<BoxChatBackend>,
        lookup: CacheLookupPolicy,
    ) -> ChatOrchestrator {
        let store = Arc::new(ConversationStore::with_limits(
            20,
            chrono::Duration::hours(24),
        ));
        let cache = Arc::new(ResponseCache::new(&CacheConfig {
            lookup,
            ..CacheConfig::default()
        }));
        let limiter = Arc::new(RateLimiter::with_cooldown(Duration::from_millis(3000)));
        let context = Arc::new(ContextBuilder::new(
            Arc::clone(&store),
            &ConversationConfig::default(),
        ));
        let gateway = Arc::new(ProviderGateway::new(backends));
        ChatOrchestrator::new(store, cache, limiter, context, gateway)
    }

    fn request(conversation_id: &str, client: &str, message: &str) -> TurnRequest {
        TurnRequest {
            conversation_id: conversation_id.to_string(),
            message: message.to_string(),
            model: None,
            client_id: client.to_string(),
        }
    }

    async fn collect(orch: &ChatOrchestrator, req: TurnRequest) -> Vec<ChatEvent> {
        orch.stream(req, CancellationToken::new())
            .unwrap()
            .collect()
            .await
    }

    fn assert_single_terminal(events: &[ChatEvent]) {
        let terminals = events.iter().filter(|e| e.is_terminal()).count();
        assert_eq!(terminals, 1, "events: {events:?}");
        assert!(events.last().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_streams_chunks_then_done_and_commits() {
        let backend = ScriptedBackend::new(
            BackendKind::LocalRuntime,
            vec![chunks(&["Hel", "lo ", "there, friend"])],
        );
        let orch = orchestrator_with(vec![BoxChatBackend::new(backend)], CacheLookupPolicy::Exact);

        let events = collect(&orch, request("c1", "client", "Hi")).await;
        assert_eq!(events.len(), 4);
        assert_eq!(events[0], ChatEvent::chunk("Hel"));
        match &events[3] {
            ChatEvent::Done {
                full_text,
                service,
                from_cache,
                model_used,
                ..
            } => {
                assert_eq!(full_text, "Hello there, friend");
                assert_eq!(service.as_deref(), Some("local_runtime"));
                assert_eq!(model_used.as_deref(), Some("local_runtime-model"));
                assert!(!from_cache);
            }
            other => panic!("expected done, got {other:?}"),
        }

        let conv = orch.store().get("c1").unwrap();
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.messages[0].sender, Sender::User);
        assert_eq!(conv.messages[1].sender, Sender::Assistant);
        assert_eq!(conv.messages[1].text, "Hello there, friend");
        assert_eq!(orch.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_assistant_message_committed_only_after_completion() {
        let backend = ScriptedBackend::new(
            BackendKind::LocalRuntime,
            vec![vec![Script::Chunk("a complete answer".to_string()), Script::Hang]],
        );
        let orch = orchestrator_with(vec![BoxChatBackend::new(backend)], CacheLookupPolicy::Exact);
        let mut stream = orch
            .stream(request("c1", "client", "Hello"), CancellationToken::new())
            .unwrap();
        assert_eq!(orch.store().get("c1").unwrap().messages.len(), 1);
        let first = stream.next().await.unwrap();
        assert_eq!(first, ChatEvent::chunk("a complete answer"));
        // Still only the user message while the backend is mid-stream.
        assert_eq!(orch.store().get("c1").unwrap().messages.len(), 1);
    }

    #[tokio::test]
    async fn test_cooldown_rejects_second_request() {
        let backend = ScriptedBackend::new(
            BackendKind::LocalRuntime,
            vec![chunks(&["a long enough reply"])],
        );
        let orch = orchestrator_with(vec![BoxChatBackend::new(backend)], CacheLookupPolicy::Exact);
        let _ = collect(&orch, request("c1", "client", "Hi")).await;

        let err = match orch.stream(request("c1", "client", "again"), CancellationToken::new()) {
            Err(err) => err,
            Ok(_) => panic!("expected cooldown rejection"),
        };
        match err {
            ChatError::Cooldown(rejection) => {
                assert!(rejection.wait_ms <= 3000);
                assert_eq!(rejection.wait_secs(), 3);
            }
            other => panic!("expected cooldown, got {other:?}"),
        }
        // The rejected message was never appended.
        assert_eq!(orch.store().get("c1").unwrap().messages.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let orch = orchestrator_with(vec![], CacheLookupPolicy::Exact);
        assert!(matches!(
            orch.stream(request("c1", "client", "   "), CancellationToken::new()),
            Err(ChatError::InvalidRequest(_))
        ));
        assert!(matches!(
            orch.stream(request("", "client", "hi"), CancellationToken::new()),
            Err(ChatError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_conversation_id_does_not_consume_cooldown() {
        let backend = ScriptedBackend::new(
            BackendKind::LocalRuntime,
            vec![chunks(&["a long enough reply"])],
        );
        let orch = orchestrator_with(vec![BoxChatBackend::new(backend)], CacheLookupPolicy::Exact);
        assert!(matches!(
            orch.stream(request("  ", "client", "hi"), CancellationToken::new()),
            Err(ChatError::InvalidRequest(_))
        ));
        let events = collect(&orch, request("c1", "client", "hi")).await;
        assert!(matches!(events.last(), Some(ChatEvent::Done { .. })));
    }

    #[tokio::test]
    async fn test_hello_on_fresh_conversation_uses_first_time_prompt() {
        let backend = ScriptedBackend::new(
            BackendKind::LocalRuntime,
            vec![chunks(&["Hi! How can I help?"])],
        );
        let last_messages = Arc::clone(&backend.last_messages);
        let orch = orchestrator_with(vec![BoxChatBackend::new(backend)], CacheLookupPolicy::Exact);

        let mut events = orch
            .stream(request("c1", "client", "Hello"), CancellationToken::new())
            .unwrap();
        assert_eq!(orch.store().get("c1").unwrap().messages.len(), 1);
        while events.next().await.is_some() {}
        assert_eq!(orch.store().get("c1").unwrap().messages.len(), 2);

        let sent = last_messages.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].role, MessageRole::System);
        assert!(sent[0].content.contains("This is the start of a new conversation"));
        assert_eq!(sent[1].role, MessageRole::User);
        assert_eq!(sent[1].content, "Hello");
    }

    #[tokio::test]
    async fn test_cache_hit_skips_backend() {
        let backend = ScriptedBackend::new(
            BackendKind::LocalRuntime,
            vec![chunks(&["the cached answer text"])],
        );
        let calls = Arc::clone(&backend.calls);
        let orch = orchestrator_with(vec![BoxChatBackend::new(backend)], CacheLookupPolicy::Exact);

        let _ = collect(&orch, request("c1", "client-a", "What is Rust?")).await;
        // A fresh conversation with the same single message produces the same key.
        let events = collect(&orch, request("c2", "client-b", "What is Rust?")).await;

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], ChatEvent::chunk("the cached answer text"));
        match &events[1] {
            ChatEvent::Done {
                from_cache,
                service,
                ..
            } => {
                assert!(from_cache);
                assert_eq!(service.as_deref(), Some("cache"));
            }
            other => panic!("expected done, got {other:?}"),
        }
        assert_eq!(orch.store().get("c2").unwrap().messages.len(), 2);
    }

    #[tokio::test]
    async fn test_short_response_not_cached() {
        let backend = ScriptedBackend::new(BackendKind::LocalRuntime, vec![chunks(&["ok"])]);
        let orch = orchestrator_with(vec![BoxChatBackend::new(backend)], CacheLookupPolicy::Exact);
        let events = collect(&orch, request("c1", "client", "Hi")).await;
        assert_single_terminal(&events);
        assert!(orch.cache().is_empty());
        assert_eq!(orch.store().get("c1").unwrap().messages.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_retries_then_surfaces() {
        let backend = ScriptedBackend::new(
            BackendKind::RemoteRouter,
            vec![fail(BackendError::rate_limited(None))],
        )
        .with_policy(RetryPolicy::default());
        let calls = Arc::clone(&backend.calls);
        let orch = orchestrator_with(vec![BoxChatBackend::new(backend)], CacheLookupPolicy::Exact);

        let started = tokio::time::Instant::now();
        let events = collect(&orch, request("c1", "client", "Hi")).await;

        // One initial attempt plus exactly three retries.
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 4);
        assert_eq!(events.len(), 1);
        match &events[0] {
            ChatEvent::Error { error_type, .. } => assert_eq!(*error_type, ErrorKind::RateLimited),
            other => panic!("expected error, got {other:?}"),
        }
        // 2s + 4s + 8s of backoff.
        assert!(started.elapsed() >= Duration::from_secs(14));
        assert_eq!(orch.store().get("c1").unwrap().messages.len(), 1);
        assert!(orch.cache().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_retry_hint_fails_without_waiting() {
        let backend = ScriptedBackend::new(
            BackendKind::RemoteRouter,
            vec![fail(
                BackendError::rate_limited(None).with_retry_after(Some(86_400_000)),
            )],
        )
        .with_policy(RetryPolicy::default());
        let calls = Arc::clone(&backend.calls);
        let orch = orchestrator_with(vec![BoxChatBackend::new(backend)], CacheLookupPolicy::Exact);

        let started = tokio::time::Instant::now();
        let events = collect(&orch, request("c1", "client", "Hi")).await;

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(events.len(), 1);
        match &events[0] {
            ChatEvent::Error {
                error_type,
                message,
                ..
            } => {
                assert_eq!(*error_type, ErrorKind::RateLimited);
                assert!(message.contains("1440 min"), "message: {message}");
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_then_success() {
        let backend = ScriptedBackend::new(
            BackendKind::RemoteRouter,
            vec![
                fail(BackendError::rate_limited(None)),
                chunks(&["recovered after retry"]),
            ],
        )
        .with_policy(RetryPolicy::default());
        let orch = orchestrator_with(vec![BoxChatBackend::new(backend)], CacheLookupPolicy::Exact);
        let events = collect(&orch, request("c1", "client", "Hi")).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], ChatEvent::Done { .. }));
    }

    #[tokio::test]
    async fn test_quota_exceeded_is_not_retried() {
        let backend = ScriptedBackend::new(
            BackendKind::RemoteRouter,
            vec![fail(BackendError::new(
                ErrorKind::QuotaExceeded,
                "daily limit reached",
            ))],
        )
        .with_policy(RetryPolicy::default());
        let calls = Arc::clone(&backend.calls);
        let orch = orchestrator_with(vec![BoxChatBackend::new(backend)], CacheLookupPolicy::Exact);
        let events = collect(&orch, request("c1", "client", "Hi")).await;
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            ChatEvent::Error { error_type: ErrorKind::QuotaExceeded, .. }
        ));
    }

    #[tokio::test]
    async fn test_mid_stream_failure_emits_one_error_and_no_commit() {
        let backend = ScriptedBackend::new(
            BackendKind::LocalRuntime,
            vec![vec![
                Script::Chunk("partial ".to_string()),
                Script::Fail(BackendError::new(ErrorKind::OutOfMemory, "oom")),
            ]],
        );
        let orch = orchestrator_with(vec![BoxChatBackend::new(backend)], CacheLookupPolicy::Exact);
        let events = collect(&orch, request("c1", "client", "Hi")).await;
        assert_eq!(events.len(), 2);
        assert_single_terminal(&events);
        assert!(matches!(
            &events[1],
            ChatEvent::Error { error_type: ErrorKind::OutOfMemory, .. }
        ));
        assert_eq!(orch.store().get("c1").unwrap().messages.len(), 1);
        assert!(orch.cache().is_empty());
    }

    #[tokio::test]
    async fn test_auto_fails_over_on_unreachable() {
        let router = ScriptedBackend::new(
            BackendKind::RemoteRouter,
            vec![fail(BackendError::unreachable("connection refused"))],
        );
        let local = ScriptedBackend::new(
            BackendKind::LocalRuntime,
            vec![chunks(&["served by the local runtime"])],
        );
        let orch = orchestrator_with(
            vec![BoxChatBackend::new(router), BoxChatBackend::new(local)],
            CacheLookupPolicy::Exact,
        );
        let events = collect(&orch, request("c1", "client", "Hi")).await;
        assert_eq!(events.len(), 2);
        match &events[1] {
            ChatEvent::Done { service, .. } => {
                assert_eq!(service.as_deref(), Some("local_runtime"))
            }
            other => panic!("expected done, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_explicit_backend_does_not_fail_over() {
        let router = ScriptedBackend::new(
            BackendKind::RemoteRouter,
            vec![fail(BackendError::unreachable("connection refused"))],
        );
        let local = ScriptedBackend::new(
            BackendKind::LocalRuntime,
            vec![chunks(&["served by the local runtime"])],
        );
        let local_calls = Arc::clone(&local.calls);
        let orch = orchestrator_with(
            vec![BoxChatBackend::new(router), BoxChatBackend::new(local)],
            CacheLookupPolicy::Exact,
        );
        let mut req = request("c1", "client", "Hi");
        req.model = Some("router".to_string());
        let events = collect(&orch, req).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            ChatEvent::Error { error_type: ErrorKind::BackendUnreachable, .. }
        ));
        assert_eq!(local_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_backends_unreachable_emits_last_error() {
        let router = ScriptedBackend::new(
            BackendKind::RemoteRouter,
            vec![fail(BackendError::unreachable("router down"))],
        );
        let local = ScriptedBackend::new(
            BackendKind::LocalRuntime,
            vec![fail(BackendError::unreachable("local down"))],
        );
        let orch = orchestrator_with(
            vec![BoxChatBackend::new(router), BoxChatBackend::new(local)],
            CacheLookupPolicy::Exact,
        );
        let events = collect(&orch, request("c1", "client", "Hi")).await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            ChatEvent::Error {
                error_type,
                original_error,
                ..
            } => {
                assert_eq!(*error_type, ErrorKind::BackendUnreachable);
                assert_eq!(original_error.as_deref(), Some("local down"));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_model_hint_is_model_not_found() {
        let backend = ScriptedBackend::new(BackendKind::LocalRuntime, vec![]);
        let orch = orchestrator_with(vec![BoxChatBackend::new(backend)], CacheLookupPolicy::Exact);
        let mut req = request("c1", "client", "Hi");
        req.model = Some("gpt-99".to_string());
        let events = collect(&orch, req).await;
        assert!(matches!(
            &events[..],
            [ChatEvent::Error { error_type: ErrorKind::ModelNotFound, .. }]
        ));
    }

    #[tokio::test]
    async fn test_cancellation_releases_backend_and_commits_nothing() {
        let backend = ScriptedBackend::new(
            BackendKind::LocalRuntime,
            vec![vec![Script::Chunk("first ".to_string()), Script::Hang]],
        );
        let released = Arc::clone(&backend.released);
        let orch = orchestrator_with(vec![BoxChatBackend::new(backend)], CacheLookupPolicy::Exact);
        let cancel = CancellationToken::new();
        let mut stream = orch
            .stream(request("c1", "client", "Hi"), cancel.clone())
            .unwrap();

        assert_eq!(stream.next().await.unwrap(), ChatEvent::chunk("first "));
        cancel.cancel();
        assert!(stream.next().await.is_none());
        assert_eq!(released.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(orch.store().get("c1").unwrap().messages.len(), 1);
        assert!(orch.cache().is_empty());
    }

    #[tokio::test]
    async fn test_dropping_stream_releases_backend() {
        let backend = ScriptedBackend::new(
            BackendKind::LocalRuntime,
            vec![vec![Script::Chunk("first ".to_string()), Script::Hang]],
        );
        let released = Arc::clone(&backend.released);
        let orch = orchestrator_with(vec![BoxChatBackend::new(backend)], CacheLookupPolicy::Exact);
        let mut stream = orch
            .stream(request("c1", "client", "Hi"), CancellationToken::new())
            .unwrap();
        let _ = stream.next().await;
        drop(stream);
        assert_eq!(released.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_respond_returns_single_reply() {
        let backend = ScriptedBackend::new(
            BackendKind::LocalRuntime,
            vec![chunks(&["Hello ", "world, nice day"])],
        );
        let orch = orchestrator_with(vec![BoxChatBackend::new(backend)], CacheLookupPolicy::Exact);
        let reply = orch
            .respond(request("c1", "client", "Hi"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply.conversation_id, "c1");
        assert_eq!(reply.response, "Hello world, nice day");
        assert!(!reply.from_cache);
    }

    #[tokio::test]
    async fn test_respond_maps_backend_failure() {
        let backend = ScriptedBackend::new(
            BackendKind::LocalRuntime,
            vec![fail(BackendError::new(ErrorKind::Timeout, "no data"))],
        );
        let orch = orchestrator_with(vec![BoxChatBackend::new(backend)], CacheLookupPolicy::Exact);
        let err = orch
            .respond(request("c1", "client", "Hi"), CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.backend_kind(), Some(ErrorKind::Timeout));
    }

    #[tokio::test]
    async fn test_delete_conversation_drops_scoped_cache() {
        let backend = ScriptedBackend::new(
            BackendKind::LocalRuntime,
            vec![chunks(&["an answer worth caching"])],
        );
        let orch = orchestrator_with(vec![BoxChatBackend::new(backend)], CacheLookupPolicy::Exact);
        let _ = collect(&orch, request("c1", "client", "Hi")).await;
        assert_eq!(orch.cache().len(), 1);
        assert!(orch.delete_conversation("c1"));
        assert!(orch.cache().is_empty());
        assert!(orch.store().get("c1").is_none());
        assert!(!orch.delete_conversation("c1"));
    }

    #[tokio::test]
    async fn test_pinned_model_is_passed_to_backend() {
        let backend = ScriptedBackend::new(
            BackendKind::SearchAugmented,
            vec![chunks(&["searched answer text"])],
        )
        .with_models(&["sonar", "sonar-pro"]);
        let last_options = Arc::clone(&backend.last_options);
        let orch = orchestrator_with(vec![BoxChatBackend::new(backend)], CacheLookupPolicy::Exact);
        let mut req = request("c1", "client", "Hi");
        req.model = Some("sonar-pro".to_string());
        let events = collect(&orch, req).await;
        match events.last().unwrap() {
            ChatEvent::Done { model_used, .. } => {
                assert_eq!(model_used.as_deref(), Some("sonar-pro"))
            }
            other => panic!("expected done, got {other:?}"),
        }
        let options = last_options.lock().unwrap().clone().unwrap();
        assert_eq!(options.model.as_deref(), Some("sonar-pro"));
    }
}
