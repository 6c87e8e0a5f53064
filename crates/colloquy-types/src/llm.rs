//! Backend request/response types for Colloquy.
//!
//! These types model the data shapes exchanged with chat-completion backends:
//! prompt messages, generation options, the closed failure taxonomy, and
//! backend identity/health.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role of a message in a backend prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(MessageRole::System),
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(format!("invalid message role: '{other}'")),
        }
    }
}

/// A single `{role, content}` entry of a backend prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Per-call generation options.
///
/// `model: None` means "use the backend's current default model".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl GenerateOptions {
    /// Options that only pin the model.
    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Default::default()
        }
    }
}

/// Closed failure taxonomy shared by every backend adapter.
///
/// Adapters translate transport errors, HTTP statuses and backend error
/// bodies into one of these kinds at the point of failure. Nothing above the
/// adapter layer ever inspects backend-specific error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimited,
    QuotaExceeded,
    BackendUnreachable,
    ModelNotFound,
    ModelNotLoaded,
    Timeout,
    OutOfMemory,
    ContextTooLong,
    NetworkError,
    GeneralError,
}

impl ErrorKind {
    /// Whether the request-scoped retry policy applies to this kind.
    ///
    /// Only transient rate limiting is retried; every other kind is terminal
    /// within a request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::RateLimited)
    }

    /// Whether an `auto`-routed request may move on to the next backend.
    pub fn allows_failover(&self) -> bool {
        matches!(self, ErrorKind::BackendUnreachable)
    }

    /// User-facing remediation hint for this kind.
    pub fn hint(&self) -> &'static str {
        match self {
            ErrorKind::RateLimited => "The service is busy. Please wait a moment and try again.",
            ErrorKind::QuotaExceeded => {
                "The daily usage limit has been reached. It resets at the start of the next period."
            }
            ErrorKind::BackendUnreachable => {
                "The AI service could not be reached. Check that it is running."
            }
            ErrorKind::ModelNotFound => {
                "The requested model is not available. Pick another model or install it first."
            }
            ErrorKind::ModelNotLoaded => "The model is still loading. Try again in a few seconds.",
            ErrorKind::Timeout => "The AI service took too long to respond. Please try again.",
            ErrorKind::OutOfMemory => {
                "The AI service ran out of memory. Try a smaller model."
            }
            ErrorKind::ContextTooLong => {
                "This conversation is too long for the model. Start a new conversation."
            }
            ErrorKind::NetworkError => "A network error occurred. Please try again.",
            ErrorKind::GeneralError => "Something went wrong while generating a response.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::QuotaExceeded => "quota_exceeded",
            ErrorKind::BackendUnreachable => "backend_unreachable",
            ErrorKind::ModelNotFound => "model_not_found",
            ErrorKind::ModelNotLoaded => "model_not_loaded",
            ErrorKind::Timeout => "timeout",
            ErrorKind::OutOfMemory => "out_of_memory",
            ErrorKind::ContextTooLong => "context_too_long",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::GeneralError => "general_error",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rate_limited" => Ok(ErrorKind::RateLimited),
            "quota_exceeded" => Ok(ErrorKind::QuotaExceeded),
            "backend_unreachable" => Ok(ErrorKind::BackendUnreachable),
            "model_not_found" => Ok(ErrorKind::ModelNotFound),
            "model_not_loaded" => Ok(ErrorKind::ModelNotLoaded),
            "timeout" => Ok(ErrorKind::Timeout),
            "out_of_memory" => Ok(ErrorKind::OutOfMemory),
            "context_too_long" => Ok(ErrorKind::ContextTooLong),
            "network_error" => Ok(ErrorKind::NetworkError),
            "general_error" => Ok(ErrorKind::GeneralError),
            other => Err(format!("invalid error kind: '{other}'")),
        }
    }
}

/// A classified backend failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct BackendError {
    pub kind: ErrorKind,
    pub message: String,
    /// Backend-provided detail, kept for diagnostics only.
    pub original: Option<String>,
    /// Server-suggested wait before retrying (rate limits) or until reset (quotas).
    pub retry_after_ms: Option<u64>,
}

impl BackendError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            original: None,
            retry_after_ms: None,
        }
    }

    pub fn with_original(mut self, original: impl Into<String>) -> Self {
        self.original = Some(original.into());
        self
    }

    pub fn with_retry_after(mut self, retry_after_ms: Option<u64>) -> Self {
        self.retry_after_ms = retry_after_ms;
        self
    }

    pub fn rate_limited(retry_after_ms: Option<u64>) -> Self {
        Self::new(ErrorKind::RateLimited, "rate limited by backend").with_retry_after(retry_after_ms)
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BackendUnreachable, message)
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::GeneralError, message)
    }

    /// User-facing message: the kind's remediation hint, plus a reset hint
    /// for quota errors when the backend provided one.
    pub fn user_message(&self) -> String {
        match (self.kind, self.retry_after_ms) {
            (ErrorKind::QuotaExceeded, Some(ms)) => {
                let minutes = ms.div_ceil(60_000);
                format!("{} Resets in about {minutes} min.", self.kind.hint())
            }
            (ErrorKind::RateLimited, Some(ms)) if ms >= 60_000 => {
                let minutes = ms.div_ceil(60_000);
                format!("{} The service asked to wait about {minutes} min.", self.kind.hint())
            }
            _ => self.kind.hint().to_string(),
        }
    }
}

/// Backend family behind the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Hosted multi-model router (OpenAI-compatible).
    RemoteRouter,
    /// Local inference runtime (Ollama-style).
    LocalRuntime,
    /// Hosted search-augmented service.
    SearchAugmented,
}

impl BackendKind {
    /// Short aliases accepted as model hints.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            BackendKind::RemoteRouter => &["remote_router", "router", "openrouter"],
            BackendKind::LocalRuntime => &["local_runtime", "local", "ollama"],
            BackendKind::SearchAugmented => &["search_augmented", "search", "perplexity"],
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::RemoteRouter => write!(f, "remote_router"),
            BackendKind::LocalRuntime => write!(f, "local_runtime"),
            BackendKind::SearchAugmented => write!(f, "search_augmented"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        [
            BackendKind::RemoteRouter,
            BackendKind::LocalRuntime,
            BackendKind::SearchAugmented,
        ]
        .into_iter()
        .find(|kind| kind.aliases().contains(&lower.as_str()))
        .ok_or_else(|| format!("invalid backend kind: '{s}'"))
    }
}

/// Reachability of a backend as reported by the health surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Error => write!(f, "error"),
        }
    }
}

/// Health report entry for one backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendHealth {
    pub service: String,
    pub connection: ConnectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// A model installed in the local runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalModel {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified_at: Option<String>,
}

/// Result of a local runtime benchmark run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub model: String,
    pub total_ms: u64,
    pub first_token_ms: Option<u64>,
    pub chunks: u32,
    pub chars_per_second: f64,
}
