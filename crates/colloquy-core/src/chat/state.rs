//! Per-request state machine.
//!
//! ```text
//! Idle -> CooldownCheck -> {Rejected | ContextBuild}
//! ContextBuild -> CacheLookup -> {CacheHit -> EmitCached -> Done | CacheMiss -> ProviderCall}
//! ProviderCall -> {Streaming -> Done | RetryableError -> ProviderCall | TerminalError -> Done}
//! ```
//!
//! The tracker only records and logs transitions; the orchestrator drives them.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    CooldownCheck,
    Rejected,
    ContextBuild,
    CacheLookup,
    CacheHit,
    EmitCached,
    CacheMiss,
    ProviderCall,
    Streaming,
    RetryableError,
    TerminalError,
    Done,
}

impl RequestState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Idle, CooldownCheck)
                | (CooldownCheck, Rejected)
                | (CooldownCheck, ContextBuild)
                | (ContextBuild, CacheLookup)
                | (CacheLookup, CacheHit)
                | (CacheLookup, CacheMiss)
                | (CacheHit, EmitCached)
                | (EmitCached, Done)
                | (CacheMiss, ProviderCall)
                | (ProviderCall, Streaming)
                | (ProviderCall, RetryableError)
                | (ProviderCall, TerminalError)
                | (ProviderCall, ProviderCall)
                | (Streaming, Done)
                | (Streaming, TerminalError)
                | (RetryableError, ProviderCall)
                | (TerminalError, Done)
        )
    }

    pub fn is_final(self) -> bool {
        matches!(self, RequestState::Rejected | RequestState::Done)
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestState::Idle => "idle",
            RequestState::CooldownCheck => "cooldown_check",
            RequestState::Rejected => "rejected",
            RequestState::ContextBuild => "context_build",
            RequestState::CacheLookup => "cache_lookup",
            RequestState::CacheHit => "cache_hit",
            RequestState::EmitCached => "emit_cached",
            RequestState::CacheMiss => "cache_miss",
            RequestState::ProviderCall => "provider_call",
            RequestState::Streaming => "streaming",
            RequestState::RetryableError => "retryable_error",
            RequestState::TerminalError => "terminal_error",
            RequestState::Done => "done",
        };
        write!(f, "{s}")
    }
}

/// Records the current state of one request and logs each transition.
#[derive(Debug)]
pub struct RequestTracker {
    conversation_id: String,
    state: RequestState,
}

impl RequestTracker {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            state: RequestState::Idle,
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn advance(&mut self, next: RequestState) {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                conversation_id = %self.conversation_id,
                from = %self.state,
                to = %next,
                "Unexpected request state transition"
            );
        } else {
            tracing::debug!(
                conversation_id = %self.conversation_id,
                from = %self.state,
                to = %next,
                "Request state transition"
            );
        }
        self.state = next;
    }
}
