//! BoxChatBackend -- object-safe dynamic dispatch wrapper for ChatBackend.
//!
//! 1. Define an object-safe `ChatBackendDyn` trait with boxed futures
//! 2. Blanket-impl `ChatBackendDyn` for all `T: ChatBackend`
//! 3. `BoxChatBackend` wraps `Box<dyn ChatBackendDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use colloquy_types::llm::{BackendError, BackendHealth, BackendKind, GenerateOptions, Message};

use super::backend::{BackendStream, ChatBackend};
use super::retry::RetryPolicy;

/// Object-safe version of [`ChatBackend`] with boxed futures.
pub trait ChatBackendDyn: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> BackendKind;

    fn default_model(&self) -> String;

    fn supports_model(&self, model: &str) -> bool;

    fn retry_policy(&self) -> RetryPolicy;

    fn generate_boxed<'a>(
        &'a self,
        messages: &'a [Message],
        options: &'a GenerateOptions,
    ) -> Pin<Box<dyn Future<Output = Result<String, BackendError>> + Send + 'a>>;

    fn generate_stream_boxed(&self, messages: Vec<Message>, options: GenerateOptions)
    -> BackendStream;

    fn health_check_boxed(&self) -> Pin<Box<dyn Future<Output = BackendHealth> + Send + '_>>;
}

/// Blanket implementation: any `ChatBackend` automatically implements `ChatBackendDyn`.
impl<T: ChatBackend> ChatBackendDyn for T {
    fn name(&self) -> &str {
        ChatBackend::name(self)
    }

    fn kind(&self) -> BackendKind {
        ChatBackend::kind(self)
    }

    fn default_model(&self) -> String {
        ChatBackend::default_model(self)
    }

    fn supports_model(&self, model: &str) -> bool {
        ChatBackend::supports_model(self, model)
    }

    fn retry_policy(&self) -> RetryPolicy {
        ChatBackend::retry_policy(self)
    }

    fn generate_boxed<'a>(
        &'a self,
        messages: &'a [Message],
        options: &'a GenerateOptions,
    ) -> Pin<Box<dyn Future<Output = Result<String, BackendError>> + Send + 'a>> {
        Box::pin(self.generate(messages, options))
    }

    fn generate_stream_boxed(
        &self,
        messages: Vec<Message>,
        options: GenerateOptions,
    ) -> BackendStream {
        self.generate_stream(messages, options)
    }

    fn health_check_boxed(&self) -> Pin<Box<dyn Future<Output = BackendHealth> + Send + '_>> {
        Box::pin(self.health_check())
    }
}

/// Type-erased chat backend for runtime backend selection.
///
/// Since `ChatBackend` uses RPITIT, it cannot be used as a trait object
/// directly. `BoxChatBackend` provides equivalent methods that delegate to
/// the inner `ChatBackendDyn` trait object.
pub struct BoxChatBackend {
    inner: Box<dyn ChatBackendDyn + Send + Sync>,
}

impl BoxChatBackend {
    /// Wrap a concrete `ChatBackend` in a type-erased box.
    pub fn new<T: ChatBackend + 'static>(backend: T) -> Self {
        Self {
            inner: Box::new(backend),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn kind(&self) -> BackendKind {
        self.inner.kind()
    }

    pub fn default_model(&self) -> String {
        self.inner.default_model()
    }

    pub fn supports_model(&self, model: &str) -> bool {
        self.inner.supports_model(model)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.inner.retry_policy()
    }

    pub async fn generate(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
    ) -> Result<String, BackendError> {
        self.inner.generate_boxed(messages, options).await
    }

    pub fn generate_stream(&self, messages: Vec<Message>, options: GenerateOptions) -> BackendStream {
        self.inner.generate_stream_boxed(messages, options)
    }

    pub async fn health_check(&self) -> BackendHealth {
        self.inner.health_check_boxed().await
    }
}

impl std::fmt::Debug for BoxChatBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxChatBackend")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}
