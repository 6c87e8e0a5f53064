//! Chat backend implementations.
//!
//! Contains concrete implementations of the [`ChatBackend`] trait defined
//! in `colloquy-core`: the hosted router, the local runtime and the
//! search-augmented service.
//!
//! Also provides the backend factory ([`create_backends`]) that builds the
//! enabled adapters from [`GlobalConfig`] in gateway priority order.
//!
//! [`ChatBackend`]: colloquy_core::llm::backend::ChatBackend

pub mod http;
pub mod local;
pub mod openai_compat;
pub mod router;
pub mod search;

use std::sync::Arc;

use colloquy_core::llm::box_backend::BoxChatBackend;
use colloquy_core::llm::gateway::ProviderGateway;
use colloquy_types::config::GlobalConfig;
use colloquy_types::llm::{BackendError, BackendKind};

use crate::config::resolve_api_key;

use self::local::LocalRuntimeBackend;
use self::router::RemoteRouterBackend;
use self::search::SearchAugmentedBackend;

const ALL_KINDS: [BackendKind; 3] = [
    BackendKind::RemoteRouter,
    BackendKind::SearchAugmented,
    BackendKind::LocalRuntime,
];

/// The configured backends.
///
/// `search` and `local` keep typed handles next to the boxed list so the
/// API can reach their extra operations (variant switching, model
/// lifecycle).
pub struct Backends {
    /// Enabled backends in gateway priority order.
    pub chat: Vec<BoxChatBackend>,
    pub search: Option<Arc<SearchAugmentedBackend>>,
    pub local: Option<Arc<LocalRuntimeBackend>>,
}

impl Backends {
    pub fn kinds(&self) -> Vec<BackendKind> {
        self.chat.iter().map(|b| b.kind()).collect()
    }

    /// Split into the gateway and the typed handles.
    pub fn into_gateway(
        self,
    ) -> (
        ProviderGateway,
        Option<Arc<SearchAugmentedBackend>>,
        Option<Arc<LocalRuntimeBackend>>,
    ) {
        (ProviderGateway::new(self.chat), self.search, self.local)
    }
}

/// Priority order: configured kinds first (duplicates ignored), then any
/// kind the config left out, in default order.
fn priority_order(configured: &[BackendKind]) -> Vec<BackendKind> {
    let mut order: Vec<BackendKind> = Vec::with_capacity(ALL_KINDS.len());
    for kind in configured.iter().chain(ALL_KINDS.iter()) {
        if !order.contains(kind) {
            order.push(*kind);
        }
    }
    order
}

/// Build every enabled backend.
///
/// Hosted backends whose API key environment variable is unset are skipped
/// with a warning rather than failing startup.
///
/// # Errors
///
/// Returns an error if an HTTP client cannot be constructed or the search
/// backend has no variants.
pub fn create_backends(config: &GlobalConfig) -> Result<Backends, BackendError> {
    let backends_config = &config.backends;
    let mut chat = Vec::new();
    let mut search = None;
    let mut local = None;

    for kind in priority_order(&backends_config.priority) {
        match kind {
            BackendKind::RemoteRouter if backends_config.router.enabled => {
                match resolve_api_key(&backends_config.router.api_key_env) {
                    Ok(key) => {
                        let router = RemoteRouterBackend::new(&backends_config.router, &config.retry, key)?;
                        chat.push(BoxChatBackend::new(router));
                    }
                    Err(err) => tracing::warn!(backend = %kind, "Skipping backend: {err}"),
                }
            }
            BackendKind::SearchAugmented if backends_config.search.enabled => {
                match resolve_api_key(&backends_config.search.api_key_env) {
                    Ok(key) => {
                        let backend = Arc::new(SearchAugmentedBackend::new(&backends_config.search, key)?);
                        chat.push(BoxChatBackend::new(Arc::clone(&backend)));
                        search = Some(backend);
                    }
                    Err(err) => tracing::warn!(backend = %kind, "Skipping backend: {err}"),
                }
            }
            BackendKind::LocalRuntime if backends_config.local.enabled => {
                let backend = Arc::new(LocalRuntimeBackend::new(&backends_config.local)?);
                chat.push(BoxChatBackend::new(Arc::clone(&backend)));
                local = Some(backend);
            }
            _ => tracing::debug!(backend = %kind, "Backend disabled"),
        }
    }

    tracing::info!(
        backends = ?chat.iter().map(|b| b.kind().to_string()).collect::<Vec<_>>(),
        "Chat backends configured"
    );
    Ok(Backends { chat, search, local })
}
