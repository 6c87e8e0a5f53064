//! LocalRuntimeBackend -- Ollama-style local inference server.
//!
//! Chat turns go to `/api/generate` as one flattened
//! `System:`/`Human:`/`Assistant:` prompt, or to `/api/chat` as structured
//! turns when `structured_turns` is set. Both endpoints stream
//! newline-delimited JSON objects. The runtime reports failures as
//! `{"error": "..."}` bodies (or lines); their text is classified here.
//!
//! Also exposes the model lifecycle (list, pull, delete) and a small
//! throughput benchmark.

use std::time::{Duration, Instant};

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use colloquy_core::llm::backend::{BackendStream, ChatBackend};
use colloquy_types::config::LocalConfig;
use colloquy_types::llm::{
    BackendError, BackendHealth, BackendKind, BenchmarkResult, ConnectionStatus, ErrorKind,
    GenerateOptions, LocalModel, Message, MessageRole,
};

use super::http::{build_client, classify_transport, ensure_success, truncate};

/// Prompt used by [`LocalRuntimeBackend::benchmark`].
const BENCHMARK_PROMPT: &str = "Write three sentences about the sea.";

/// Model pulls can take minutes; they get their own timeout.
const PULL_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Serialize)]
struct RuntimeOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Serialize)]
struct GenerateBody {
    model: String,
    prompt: String,
    stream: bool,
    options: RuntimeOptions,
}

#[derive(Debug, Serialize)]
struct ChatBody {
    model: String,
    messages: Vec<Message>,
    stream: bool,
    options: RuntimeOptions,
}

/// One NDJSON line from either endpoint.
#[derive(Debug, Default, Deserialize)]
struct RuntimeLine {
    /// `/api/generate` text.
    #[serde(default)]
    response: Option<String>,
    /// `/api/chat` text.
    #[serde(default)]
    message: Option<LineMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LineMessage {
    #[serde(default)]
    content: String,
}

impl RuntimeLine {
    fn into_text(self) -> Result<(String, bool), BackendError> {
        if let Some(error) = self.error {
            return Err(classify_runtime_message(None, &error));
        }
        let text = self
            .response
            .or_else(|| self.message.map(|m| m.content))
            .unwrap_or_default();
        Ok((text, self.done))
    }
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<LocalModel>,
}

/// Flatten role-tagged turns into a single completion prompt ending in an
/// open `Assistant:` turn.
pub fn flatten_prompt(messages: &[Message]) -> String {
    let mut prompt = String::new();
    for message in messages {
        let label = match message.role {
            MessageRole::System => "System",
            MessageRole::User => "Human",
            MessageRole::Assistant => "Assistant",
        };
        prompt.push_str(label);
        prompt.push_str(": ");
        prompt.push_str(message.content.trim());
        prompt.push_str("\n\n");
    }
    prompt.push_str("Assistant:");
    prompt
}

/// Classify an error reported by the runtime, optionally with its HTTP status.
pub fn classify_runtime_message(status: Option<u16>, message: &str) -> BackendError {
    let lower = message.to_lowercase();
    let kind = if lower.contains("not found") || lower.contains("try pulling") {
        ErrorKind::ModelNotFound
    } else if lower.contains("out of memory")
        || lower.contains("requires more system memory")
        || lower.contains("insufficient memory")
        || lower.contains("cuda error")
    {
        ErrorKind::OutOfMemory
    } else if lower.contains("loading model") || lower.contains("model is loading") {
        ErrorKind::ModelNotLoaded
    } else if lower.contains("context length")
        || lower.contains("context window")
        || lower.contains("exceeds the context")
        || lower.contains("too long")
    {
        ErrorKind::ContextTooLong
    } else if lower.contains("timed out") || lower.contains("timeout") {
        ErrorKind::Timeout
    } else {
        match status {
            Some(404) => ErrorKind::ModelNotFound,
            Some(408) | Some(504) => ErrorKind::Timeout,
            Some(503) => ErrorKind::ModelNotLoaded,
            _ => ErrorKind::GeneralError,
        }
    };
    let summary = match status {
        Some(code) => format!("local runtime returned HTTP {code}"),
        None => "local runtime reported an error".to_string(),
    };
    BackendError::new(kind, summary).with_original(truncate(message))
}

fn classify_runtime_status(status: u16, message: &str, _retry_after: Option<u64>) -> BackendError {
    classify_runtime_message(Some(status), message)
}

pub struct LocalRuntimeBackend {
    client: reqwest::Client,
    base_url: String,
    default_model: String,
    structured_turns: bool,
}

impl std::fmt::Debug for LocalRuntimeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalRuntimeBackend")
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("structured_turns", &self.structured_turns)
            .finish()
    }
}

impl LocalRuntimeBackend {
    pub fn new(config: &LocalConfig) -> Result<Self, BackendError> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_model: config.default_model.clone(),
            structured_turns: config.structured_turns,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn model_for(&self, options: &GenerateOptions) -> String {
        options
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone())
    }

    fn request(&self, messages: Vec<Message>, options: &GenerateOptions, stream: bool) -> reqwest::RequestBuilder {
        let model = self.model_for(options);
        let runtime_options = RuntimeOptions {
            temperature: options.temperature,
            num_predict: options.max_tokens,
        };
        if self.structured_turns {
            self.client.post(self.url("/api/chat")).json(&ChatBody {
                model,
                messages,
                stream,
                options: runtime_options,
            })
        } else {
            self.client.post(self.url("/api/generate")).json(&GenerateBody {
                model,
                prompt: flatten_prompt(&messages),
                stream,
                options: runtime_options,
            })
        }
    }

    /// Installed models, as reported by `/api/tags`.
    pub async fn list_models(&self) -> Result<Vec<LocalModel>, BackendError> {
        let response = self
            .client
            .get(self.url("/api/tags"))
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;
        let response = ensure_success(response, classify_runtime_status).await?;
        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| BackendError::general(format!("failed to parse model list: {e}")))?;
        Ok(tags.models)
    }

    /// Download a model. Blocks until the runtime reports completion.
    pub async fn pull_model(&self, name: &str) -> Result<(), BackendError> {
        tracing::info!(model = name, "Pulling local model");
        let response = self
            .client
            .post(self.url("/api/pull"))
            .timeout(PULL_TIMEOUT)
            .json(&serde_json::json!({ "model": name, "stream": false }))
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;
        let response = ensure_success(response, classify_runtime_status).await?;
        let line: RuntimeLine = response.json().await.unwrap_or_default();
        if let Some(error) = line.error {
            return Err(classify_runtime_message(None, &error));
        }
        Ok(())
    }

    /// Remove an installed model.
    pub async fn delete_model(&self, name: &str) -> Result<(), BackendError> {
        tracing::info!(model = name, "Deleting local model");
        let response = self
            .client
            .delete(self.url("/api/delete"))
            .json(&serde_json::json!({ "model": name }))
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;
        ensure_success(response, classify_runtime_status).await?;
        Ok(())
    }

    /// Stream a fixed prompt through `model` and measure latency and
    /// throughput.
    pub async fn benchmark(&self, model: &str) -> Result<BenchmarkResult, BackendError> {
        let start = Instant::now();
        let mut first_token_ms = None;
        let mut chunks = 0u32;
        let mut chars = 0usize;

        let mut stream = self.generate_stream(
            vec![Message::user(BENCHMARK_PROMPT)],
            GenerateOptions::with_model(model),
        );
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if first_token_ms.is_none() {
                first_token_ms = Some(start.elapsed().as_millis() as u64);
            }
            chunks += 1;
            chars += chunk.chars().count();
        }

        let elapsed = start.elapsed();
        let secs = elapsed.as_secs_f64();
        Ok(BenchmarkResult {
            model: model.to_string(),
            total_ms: elapsed.as_millis() as u64,
            first_token_ms,
            chunks,
            chars_per_second: if secs > 0.0 { chars as f64 / secs } else { 0.0 },
        })
    }
}

/// Split buffered bytes into complete lines, keeping the trailing partial
/// line in `buffer`.
fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=pos).collect();
        let text = String::from_utf8_lossy(&line).trim().to_string();
        if !text.is_empty() {
            lines.push(text);
        }
    }
    lines
}

fn parse_line(line: &str) -> Result<(String, bool), BackendError> {
    serde_json::from_str::<RuntimeLine>(line)
        .map_err(|e| BackendError::general(format!("malformed runtime line: {e}")))?
        .into_text()
}

impl ChatBackend for LocalRuntimeBackend {
    fn name(&self) -> &str {
        "local"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::LocalRuntime
    }

    fn default_model(&self) -> String {
        self.default_model.clone()
    }

    /// Local model ids never contain `/`; anything else may be installed.
    fn supports_model(&self, model: &str) -> bool {
        !model.is_empty() && !model.contains('/')
    }

    async fn generate(&self, messages: &[Message], options: &GenerateOptions) -> Result<String, BackendError> {
        let response = self
            .request(messages.to_vec(), options, false)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;
        let response = ensure_success(response, classify_runtime_status).await?;
        let body = response.text().await.map_err(|e| classify_transport(&e))?;
        parse_line(body.trim()).map(|(text, _)| text)
    }

    fn generate_stream(&self, messages: Vec<Message>, options: GenerateOptions) -> BackendStream {
        let request = self.request(messages, &options, true);
        tracing::debug!(backend = "local", model = %self.model_for(&options), "Opening runtime stream");

        Box::pin(async_stream::try_stream! {
            let response = request.send().await.map_err(|e| classify_transport(&e))?;
            let response = ensure_success(response, classify_runtime_status).await?;
            let mut bytes = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();
            let mut finished = false;

            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| classify_transport(&e))?;
                buffer.extend_from_slice(&chunk);
                for line in drain_lines(&mut buffer) {
                    let (text, done) = parse_line(&line)?;
                    if !text.is_empty() {
                        yield text;
                    }
                    if done {
                        finished = true;
                        break;
                    }
                }
                if finished {
                    break;
                }
            }

            if !finished {
                let rest = String::from_utf8_lossy(&buffer).trim().to_string();
                if !rest.is_empty() {
                    let (text, _) = parse_line(&rest)?;
                    if !text.is_empty() {
                        yield text;
                    }
                }
            }
        })
    }

    async fn health_check(&self) -> BackendHealth {
        let mut health = BackendHealth {
            service: self.kind().to_string(),
            connection: ConnectionStatus::Disconnected,
            model: Some(self.default_model.clone()),
            detail: None,
        };
        match self.list_models().await {
            Ok(models) => {
                health.connection = ConnectionStatus::Connected;
                let tagged = format!("{}:", self.default_model);
                let installed = models
                    .iter()
                    .any(|m| m.name == self.default_model || m.name.starts_with(&tagged));
                if !installed {
                    health.detail = Some(format!("default model '{}' is not installed", self.default_model));
                }
            }
            Err(err) if err.kind == ErrorKind::BackendUnreachable => {
                health.detail = Some(err.message);
            }
            Err(err) => {
                health.connection = ConnectionStatus::Error;
                health.detail = Some(err.to_string());
            }
        }
        health
    }
}
