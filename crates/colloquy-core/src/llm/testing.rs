//! Scripted in-process backend for unit tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use colloquy_types::llm::{
    BackendError, BackendHealth, BackendKind, ConnectionStatus, GenerateOptions, Message,
};

use super::backend::{BackendStream, ChatBackend};
use super::retry::RetryPolicy;

/// One step of a scripted stream.
#[derive(Debug, Clone)]
pub enum Step {
    Chunk(String),
    Fail(BackendError),
    /// Never yields again.
    Hang,
}

pub fn chunks(parts: &[&str]) -> Vec<Step> {
    parts.iter().map(|p| Step::Chunk((*p).to_string())).collect()
}

pub fn fail(err: BackendError) -> Vec<Step> {
    vec![Step::Fail(err)]
}

struct ReleaseGuard(Arc<AtomicUsize>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Backend that replays queued scripts, one per call.
///
/// When the queue is empty the last script is replayed.
pub struct ScriptedBackend {
    name: String,
    kind: BackendKind,
    models: Vec<String>,
    scripts: Mutex<VecDeque<Vec<Step>>>,
    last: Mutex<Vec<Step>>,
    policy: RetryPolicy,
    connection: ConnectionStatus,
    pub calls: Arc<AtomicUsize>,
    pub released: Arc<AtomicUsize>,
    pub last_options: Arc<Mutex<Option<GenerateOptions>>>,
    /// Messages passed to the most recent call, system prompt first.
    pub last_messages: Arc<Mutex<Vec<Message>>>,
}

impl ScriptedBackend {
    pub fn new(kind: BackendKind, scripts: Vec<Vec<Step>>) -> Self {
        let last = scripts.last().cloned().unwrap_or_default();
        Self {
            name: format!("scripted-{kind}"),
            kind,
            models: vec![format!("{kind}-model")],
            scripts: Mutex::new(scripts.into()),
            last: Mutex::new(last),
            policy: RetryPolicy::none(),
            connection: ConnectionStatus::Connected,
            calls: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicUsize::new(0)),
            last_options: Arc::new(Mutex::new(None)),
            last_messages: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_models(mut self, models: &[&str]) -> Self {
        self.models = models.iter().map(|m| (*m).to_string()).collect();
        self
    }

    pub fn with_connection(mut self, connection: ConnectionStatus) -> Self {
        self.connection = connection;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_script(&self) -> Vec<Step> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.pop_front() {
            Some(script) => script,
            None => self.last.lock().unwrap().clone(),
        }
    }
}

impl ChatBackend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn default_model(&self) -> String {
        self.models.first().cloned().unwrap_or_default()
    }

    fn supports_model(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    async fn generate(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
    ) -> Result<String, BackendError> {
        *self.last_options.lock().unwrap() = Some(options.clone());
        *self.last_messages.lock().unwrap() = messages.to_vec();
        let mut out = String::new();
        for step in self.next_script() {
            match step {
                Step::Chunk(c) => out.push_str(&c),
                Step::Fail(e) => return Err(e),
                Step::Hang => std::future::pending::<()>().await,
            }
        }
        Ok(out)
    }

    fn generate_stream(&self, messages: Vec<Message>, options: GenerateOptions) -> BackendStream {
        *self.last_options.lock().unwrap() = Some(options);
        *self.last_messages.lock().unwrap() = messages;
        let steps = self.next_script();
        let guard = ReleaseGuard(Arc::clone(&self.released));
        Box::pin(async_stream::stream! {
            let _guard = guard;
            for step in steps {
                match step {
                    Step::Chunk(c) => yield Ok(c),
                    Step::Fail(e) => {
                        yield Err(e);
                        return;
                    }
                    Step::Hang => std::future::pending::<()>().await,
                }
            }
        })
    }

    async fn health_check(&self) -> BackendHealth {
        BackendHealth {
            service: self.kind.to_string(),
            connection: self.connection,
            model: Some(self.default_model()),
            detail: None,
        }
    }
}
