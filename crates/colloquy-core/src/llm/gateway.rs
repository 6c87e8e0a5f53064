//! Provider gateway: model-hint routing over the configured backends.
//!
//! Backends are held in priority order. A hint resolves to an ordered list of
//! routes; only `auto` yields more than one, and the orchestrator moves to
//! the next route only when a backend is unreachable before streaming began.

use std::sync::Arc;

use futures_util::future::join_all;

use colloquy_types::llm::{BackendError, BackendHealth, BackendKind, ErrorKind};

use super::box_backend::BoxChatBackend;

/// Hint value that selects every backend in priority order.
pub const AUTO: &str = "auto";

/// A backend paired with the model to request from it.
///
/// `model: None` means the backend's current default model.
#[derive(Debug, Clone)]
pub struct Route {
    pub backend: Arc<BoxChatBackend>,
    pub model: Option<String>,
}

impl Route {
    /// Model name reported to the caller.
    pub fn model_name(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.backend.default_model())
    }
}

pub struct ProviderGateway {
    backends: Vec<Arc<BoxChatBackend>>,
}

impl ProviderGateway {
    /// Create a gateway. `backends` must already be in priority order.
    pub fn new(backends: Vec<BoxChatBackend>) -> Self {
        Self {
            backends: backends.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn backends(&self) -> &[Arc<BoxChatBackend>] {
        &self.backends
    }

    pub fn backend(&self, kind: BackendKind) -> Option<Arc<BoxChatBackend>> {
        self.backends.iter().find(|b| b.kind() == kind).cloned()
    }

    /// Resolve a model hint into an ordered, non-empty list of routes.
    pub fn resolve(&self, hint: &str) -> Result<Vec<Route>, BackendError> {
        let hint = hint.trim();
        if hint.is_empty() || hint.eq_ignore_ascii_case(AUTO) {
            if self.backends.is_empty() {
                return Err(BackendError::unreachable("no chat backends are configured"));
            }
            return Ok(self
                .backends
                .iter()
                .map(|backend| Route {
                    backend: Arc::clone(backend),
                    model: None,
                })
                .collect());
        }

        if let Ok(kind) = hint.parse::<BackendKind>() {
            return match self.backend(kind) {
                Some(backend) => Ok(vec![Route {
                    backend,
                    model: None,
                }]),
                None => Err(BackendError::new(
                    ErrorKind::ModelNotFound,
                    format!("backend '{kind}' is not configured"),
                )),
            };
        }

        self.backends
            .iter()
            .find(|b| b.supports_model(hint))
            .map(|backend| {
                vec![Route {
                    backend: Arc::clone(backend),
                    model: Some(hint.to_string()),
                }]
            })
            .ok_or_else(|| {
                BackendError::new(
                    ErrorKind::ModelNotFound,
                    format!("no backend serves model '{hint}'"),
                )
            })
    }

    /// Probe every backend concurrently.
    pub async fn health(&self) -> Vec<BackendHealth> {
        join_all(self.backends.iter().map(|b| b.health_check())).await
    }
}
