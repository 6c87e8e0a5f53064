//! OpenAI-compatible chat-completions wire format.
//!
//! Both the hosted router and the search-augmented service speak this
//! protocol (`POST {base}/chat/completions`, SSE when `stream: true`), so
//! request building, response parsing and stream decoding live here once.

pub mod streaming;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use colloquy_types::llm::{BackendError, GenerateOptions, Message};

use super::http::{StatusClassifier, classify_transport, ensure_success, error_message};

/// Request body for `/chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Service-specific fields merged into the top level of the body.
    #[serde(flatten, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ChatCompletionRequest {
    pub fn new(model: String, messages: Vec<Message>, options: &GenerateOptions, stream: bool) -> Self {
        Self {
            model,
            messages,
            stream,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_extra(mut self, key: &str, value: serde_json::Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ResponseChoice>,
}

#[derive(Debug, Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Connection details for one OpenAI-compatible endpoint.
///
/// Does not derive Debug so the API key can never be printed.
#[derive(Clone)]
pub struct Endpoint {
    pub client: reqwest::Client,
    pub base_url: String,
    pub api_key: SecretString,
    pub classify: StatusClassifier,
}

impl Endpoint {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// A request builder for `/chat/completions` with auth headers set.
    pub fn completions(&self, body: &ChatCompletionRequest) -> reqwest::RequestBuilder {
        self.client
            .post(self.url("/chat/completions"))
            .bearer_auth(self.api_key.expose_secret())
            .header("X-Title", "Colloquy")
            .json(body)
    }

    /// A GET request against `path` with auth headers set.
    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(self.url(path))
            .bearer_auth(self.api_key.expose_secret())
    }

    /// Send a non-streaming completion and return the first choice's text.
    pub async fn complete(&self, body: &ChatCompletionRequest) -> Result<String, BackendError> {
        let response = self
            .completions(body)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;
        let response = ensure_success(response, self.classify).await?;
        let text = response.text().await.map_err(|e| classify_transport(&e))?;
        parse_completion(&text)
    }
}

/// Extract the first choice's content from a non-streaming response body.
pub fn parse_completion(body: &str) -> Result<String, BackendError> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body).map_err(|e| {
        BackendError::general(format!("failed to parse completion response: {e}"))
            .with_original(error_message(body))
    })?;
    Ok(parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_types::llm::ErrorKind;

    #[test]
    fn test_request_serialization_skips_empty_fields() {
        let body = ChatCompletionRequest::new(
            "m".to_string(),
            vec![Message::system("be brief"), Message::user("hi")],
            &GenerateOptions::default(),
            true,
        );
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "m");
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert!(json.get("temperature").is_none());
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_request_extra_fields_are_flattened() {
        let options = GenerateOptions {
            temperature: Some(0.2),
            max_tokens: Some(256),
            ..Default::default()
        };
        let body = ChatCompletionRequest::new("m".to_string(), vec![], &options, false)
            .with_extra("return_images", serde_json::Value::Bool(false));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["return_images"], false);
        assert_eq!(json["max_tokens"], 256);
        assert!((json["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_parse_completion() {
        let body = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"Hello!"}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "Hello!");
        assert_eq!(parse_completion(r#"{"choices":[]}"#).unwrap(), "");
    }

    #[test]
    fn test_parse_completion_rejects_garbage() {
        let err = parse_completion("<html>oops</html>").unwrap_err();
        assert_eq!(err.kind, ErrorKind::GeneralError);
        assert_eq!(err.original.as_deref(), Some("<html>oops</html>"));
    }
}
