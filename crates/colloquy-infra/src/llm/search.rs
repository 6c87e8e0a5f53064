//! SearchAugmentedBackend -- hosted search-augmented chat service.
//!
//! The service offers a fixed set of named model variants. The active
//! variant can be switched at runtime and is what `auto` routing uses.
//! Lightweight variants ask the service to omit citations and images.

use std::sync::RwLock;

use secrecy::SecretString;

use colloquy_core::llm::backend::{BackendStream, ChatBackend};
use colloquy_types::config::{SearchConfig, SearchVariant};
use colloquy_types::llm::{
    BackendError, BackendHealth, BackendKind, ConnectionStatus, ErrorKind, GenerateOptions, Message,
};

use super::http::{build_client, classify_hosted_status, classify_transport};
use super::openai_compat::streaming::text_stream;
use super::openai_compat::{ChatCompletionRequest, Endpoint};

pub struct SearchAugmentedBackend {
    endpoint: Endpoint,
    variants: Vec<SearchVariant>,
    current: RwLock<SearchVariant>,
}

impl SearchAugmentedBackend {
    pub fn new(config: &SearchConfig, api_key: SecretString) -> Result<Self, BackendError> {
        let first = config
            .variants
            .first()
            .cloned()
            .ok_or_else(|| BackendError::general("search backend has no model variants"))?;
        let current = find_variant(&config.variants, &config.default_variant).unwrap_or_else(|| {
            tracing::warn!(
                variant = %config.default_variant,
                fallback = %first.name,
                "Unknown default search variant"
            );
            first
        });

        Ok(Self {
            endpoint: Endpoint {
                client: build_client(config.timeout_secs)?,
                base_url: config.base_url.clone(),
                api_key,
                classify: classify_hosted_status,
            },
            variants: config.variants.clone(),
            current: RwLock::new(current),
        })
    }

    pub fn variants(&self) -> &[SearchVariant] {
        &self.variants
    }

    /// The active variant.
    pub fn current_model(&self) -> SearchVariant {
        self.current
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Make `name` (a variant name or model id) the active variant.
    pub fn switch_model(&self, name: &str) -> Result<SearchVariant, BackendError> {
        let variant = find_variant(&self.variants, name).ok_or_else(|| {
            BackendError::new(ErrorKind::ModelNotFound, format!("unknown search model '{name}'"))
        })?;
        let mut current = self.current.write().unwrap_or_else(|p| p.into_inner());
        tracing::info!(from = %current.name, to = %variant.name, "Switched search model");
        *current = variant.clone();
        Ok(variant)
    }

    fn request(&self, messages: Vec<Message>, options: &GenerateOptions, stream: bool) -> ChatCompletionRequest {
        let variant = options
            .model
            .as_deref()
            .and_then(|m| find_variant(&self.variants, m))
            .unwrap_or_else(|| self.current_model());
        let body = ChatCompletionRequest::new(variant.model.clone(), messages, options, stream);
        if variant.lightweight {
            body.with_extra("return_citations", serde_json::Value::Bool(false))
                .with_extra("return_images", serde_json::Value::Bool(false))
        } else {
            body
        }
    }
}

fn find_variant(variants: &[SearchVariant], name: &str) -> Option<SearchVariant> {
    variants
        .iter()
        .find(|v| v.name.eq_ignore_ascii_case(name) || v.model.eq_ignore_ascii_case(name))
        .cloned()
}

// SearchAugmentedBackend intentionally does NOT derive Debug; the endpoint
// holds the API key.

impl ChatBackend for SearchAugmentedBackend {
    fn name(&self) -> &str {
        "search"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::SearchAugmented
    }

    fn default_model(&self) -> String {
        self.current_model().model
    }

    fn supports_model(&self, model: &str) -> bool {
        find_variant(&self.variants, model).is_some()
    }

    async fn generate(&self, messages: &[Message], options: &GenerateOptions) -> Result<String, BackendError> {
        let body = self.request(messages.to_vec(), options, false);
        self.endpoint.complete(&body).await
    }

    fn generate_stream(&self, messages: Vec<Message>, options: GenerateOptions) -> BackendStream {
        let body = self.request(messages, &options, true);
        tracing::debug!(backend = "search", model = %body.model, "Opening completion stream");
        text_stream(self.endpoint.completions(&body), self.endpoint.classify)
    }

    /// The service has no free probe endpoint; any HTTP answer from the
    /// base URL counts as reachable.
    async fn health_check(&self) -> BackendHealth {
        let mut health = BackendHealth {
            service: self.kind().to_string(),
            connection: ConnectionStatus::Connected,
            model: Some(self.current_model().name),
            detail: None,
        };
        if let Err(e) = self.endpoint.get("").send().await {
            let err = classify_transport(&e);
            health.connection = if err.kind == ErrorKind::BackendUnreachable {
                ConnectionStatus::Disconnected
            } else {
                ConnectionStatus::Error
            };
            health.detail = Some(err.message);
        }
        health
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> SearchAugmentedBackend {
        let config = SearchConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            ..Default::default()
        };
        SearchAugmentedBackend::new(&config, SecretString::from("pplx-test")).unwrap()
    }

    #[test]
    fn test_default_variant_is_active() {
        let search = backend();
        assert_eq!(search.current_model().name, "sonar");
        assert_eq!(search.default_model(), "sonar");
        assert_eq!(search.variants().len(), 3);
    }

    #[test]
    fn test_switch_model() {
        let search = backend();
        let variant = search.switch_model("SONAR-PRO").unwrap();
        assert_eq!(variant.name, "sonar-pro");
        assert_eq!(search.default_model(), "sonar-pro");

        let err = search.switch_model("gpt-4").unwrap_err();
        assert_eq!(err.kind, ErrorKind::ModelNotFound);
        assert_eq!(search.current_model().name, "sonar-pro");
    }

    #[test]
    fn test_lightweight_variant_suppresses_citations() {
        let search = backend();
        let body = search.request(vec![Message::user("news?")], &GenerateOptions::default(), true);
        assert_eq!(body.extra.get("return_citations"), Some(&serde_json::Value::Bool(false)));
        assert_eq!(body.extra.get("return_images"), Some(&serde_json::Value::Bool(false)));

        let body = search.request(vec![], &GenerateOptions::with_model("sonar-reasoning"), true);
        assert_eq!(body.model, "sonar-reasoning");
        assert!(body.extra.is_empty());
    }

    #[test]
    fn test_supports_only_known_variants() {
        let search = backend();
        assert!(search.supports_model("sonar"));
        assert!(search.supports_model("sonar-pro"));
        assert!(!search.supports_model("llama3.2"));
    }

    #[test]
    fn test_unknown_default_falls_back_to_first_variant() {
        let config = SearchConfig {
            default_variant: "missing".to_string(),
            ..Default::default()
        };
        let search = SearchAugmentedBackend::new(&config, SecretString::from("k")).unwrap();
        assert_eq!(search.current_model().name, "sonar");
    }

    #[test]
    fn test_no_variants_is_rejected() {
        let config = SearchConfig {
            variants: Vec::new(),
            ..Default::default()
        };
        assert!(SearchAugmentedBackend::new(&config, SecretString::from("k")).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_health() {
        let health = backend().health_check().await;
        assert_eq!(health.connection, ConnectionStatus::Disconnected);
        assert_eq!(health.model.as_deref(), Some("sonar"));
    }
}
