//! RemoteRouterBackend -- hosted OpenAI-compatible multi-model router.
//!
//! Serves any model id of the form `vendor/model` plus the ids listed in
//! config. Transient 429s carry the backend's exponential backoff policy;
//! daily caps surface as `quota_exceeded` and are never retried.
//!
//! The API key is wrapped in [`SecretString`] and is never logged or
//! included in `Debug` output.

use secrecy::SecretString;

use colloquy_core::llm::backend::{BackendStream, ChatBackend};
use colloquy_core::llm::retry::RetryPolicy;
use colloquy_types::config::{RetryConfig, RouterConfig};
use colloquy_types::llm::{
    BackendError, BackendHealth, BackendKind, ConnectionStatus, GenerateOptions, Message,
};

use super::http::{build_client, classify_hosted_status, classify_transport, ensure_success};
use super::openai_compat::streaming::text_stream;
use super::openai_compat::{ChatCompletionRequest, Endpoint};

pub struct RemoteRouterBackend {
    endpoint: Endpoint,
    default_model: String,
    models: Vec<String>,
    retry: RetryPolicy,
}

impl RemoteRouterBackend {
    pub fn new(
        config: &RouterConfig,
        retry: &RetryConfig,
        api_key: SecretString,
    ) -> Result<Self, BackendError> {
        Ok(Self {
            endpoint: Endpoint {
                client: build_client(config.timeout_secs)?,
                base_url: config.base_url.clone(),
                api_key,
                classify: classify_hosted_status,
            },
            default_model: config.default_model.clone(),
            models: config.models.clone(),
            retry: RetryPolicy::from_config(retry),
        })
    }

    fn request(&self, messages: Vec<Message>, options: &GenerateOptions, stream: bool) -> ChatCompletionRequest {
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        ChatCompletionRequest::new(model, messages, options, stream)
    }
}

// RemoteRouterBackend intentionally does NOT derive Debug; the endpoint
// holds the API key.

impl ChatBackend for RemoteRouterBackend {
    fn name(&self) -> &str {
        "router"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::RemoteRouter
    }

    fn default_model(&self) -> String {
        self.default_model.clone()
    }

    fn supports_model(&self, model: &str) -> bool {
        model.contains('/') || self.models.iter().any(|m| m == model)
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Non-streaming completion. Applies the retry policy itself, since
    /// there is no orchestrator in between.
    async fn generate(&self, messages: &[Message], options: &GenerateOptions) -> Result<String, BackendError> {
        let body = self.request(messages.to_vec(), options, false);
        let mut attempt = 0;
        loop {
            let err = match self.endpoint.complete(&body).await {
                Err(err) if err.kind.is_retryable() => err,
                other => return other,
            };
            let Some(delay) = self.retry.next_delay(attempt, err.retry_after_ms) else {
                return Err(err);
            };
            attempt += 1;
            tracing::warn!(
                backend = "router",
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Rate limited, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn generate_stream(&self, messages: Vec<Message>, options: GenerateOptions) -> BackendStream {
        let body = self.request(messages, &options, true);
        tracing::debug!(backend = "router", model = %body.model, "Opening completion stream");
        text_stream(self.endpoint.completions(&body), self.endpoint.classify)
    }

    async fn health_check(&self) -> BackendHealth {
        let mut health = BackendHealth {
            service: self.kind().to_string(),
            connection: ConnectionStatus::Disconnected,
            model: Some(self.default_model.clone()),
            detail: None,
        };

        let response = match self.endpoint.get("/models").send().await {
            Ok(response) => response,
            Err(e) => {
                health.detail = Some(classify_transport(&e).message);
                return health;
            }
        };
        match ensure_success(response, self.endpoint.classify).await {
            Ok(_) => health.connection = ConnectionStatus::Connected,
            Err(err) => {
                health.connection = ConnectionStatus::Error;
                health.detail = Some(err.to_string());
            }
        }
        health
    }
}
