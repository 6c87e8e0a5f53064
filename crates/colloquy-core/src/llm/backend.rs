//! ChatBackend trait definition.
//!
//! This is the core abstraction every chat-completion backend implements.
//! Uses RPITIT for `generate` and `health_check`, and `Pin<Box<dyn Stream>>`
//! for `generate_stream` (streams need to be object-safe for the
//! `BoxChatBackend` wrapper).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::Stream;

use colloquy_types::llm::{BackendError, BackendHealth, BackendKind, GenerateOptions, Message};

use super::retry::RetryPolicy;

/// Stream of text chunks from a backend. Errors are already classified.
pub type BackendStream = Pin<Box<dyn Stream<Item = Result<String, BackendError>> + Send + 'static>>;

/// Trait for chat-completion backends (hosted router, local runtime,
/// search-augmented service).
///
/// Implementations live in colloquy-infra. Every implementation translates
/// its own transport and protocol failures into [`BackendError`] before
/// returning; callers never see backend-specific error text.
pub trait ChatBackend: Send + Sync {
    /// Human-readable backend name used in logs.
    fn name(&self) -> &str;

    fn kind(&self) -> BackendKind;

    /// Model used when a request does not pin one. May change at runtime.
    fn default_model(&self) -> String;

    /// Whether this backend can serve the given model id.
    fn supports_model(&self, model: &str) -> bool;

    /// Retry policy for `rate_limited` failures. Defaults to no retries.
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::none()
    }

    /// Generate a complete response.
    fn generate(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
    ) -> impl Future<Output = Result<String, BackendError>> + Send;

    /// Generate a response as a stream of text chunks.
    ///
    /// Dropping the stream releases the underlying connection.
    fn generate_stream(&self, messages: Vec<Message>, options: GenerateOptions) -> BackendStream;

    /// Probe reachability. Never fails; problems are reported in the result.
    fn health_check(&self) -> impl Future<Output = BackendHealth> + Send;
}

impl<T: ChatBackend> ChatBackend for Arc<T> {
    fn name(&self) -> &str {
        T::name(self)
    }

    fn kind(&self) -> BackendKind {
        T::kind(self)
    }

    fn default_model(&self) -> String {
        T::default_model(self)
    }

    fn supports_model(&self, model: &str) -> bool {
        T::supports_model(self, model)
    }

    fn retry_policy(&self) -> RetryPolicy {
        T::retry_policy(self)
    }

    fn generate(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
    ) -> impl Future<Output = Result<String, BackendError>> + Send {
        T::generate(self, messages, options)
    }

    fn generate_stream(&self, messages: Vec<Message>, options: GenerateOptions) -> BackendStream {
        T::generate_stream(self, messages, options)
    }

    fn health_check(&self) -> impl Future<Output = BackendHealth> + Send {
        T::health_check(self)
    }
}
