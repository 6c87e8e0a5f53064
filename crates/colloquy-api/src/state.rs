//! Application state wiring all services together.
//!
//! AppState holds the service instances used by both the CLI and the REST
//! API. The in-memory stores are constructed here and injected into the
//! orchestrator; the backends come from the infra factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use colloquy_core::cache::response::ResponseCache;
use colloquy_core::chat::orchestrator::ChatOrchestrator;
use colloquy_core::context::builder::ContextBuilder;
use colloquy_core::conversation::store::ConversationStore;
use colloquy_core::llm::gateway::ProviderGateway;
use colloquy_core::maintenance::spawn_maintenance;
use colloquy_core::rate_limit::RateLimiter;
use colloquy_infra::config::{load_config_file, load_global_config, resolve_data_dir};
use colloquy_infra::llm::create_backends;
use colloquy_infra::llm::local::LocalRuntimeBackend;
use colloquy_infra::llm::search::SearchAugmentedBackend;
use colloquy_types::config::GlobalConfig;

/// Shared application state holding all services.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GlobalConfig>,
    pub orchestrator: ChatOrchestrator,
    /// Typed handle for runtime variant switching.
    pub search: Option<Arc<SearchAugmentedBackend>>,
    /// Typed handle for the model lifecycle commands.
    pub local: Option<Arc<LocalRuntimeBackend>>,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Load configuration and build every service.
    ///
    /// An explicit `config_path` must exist and parse; otherwise
    /// `{data_dir}/config.toml` is used when present.
    pub async fn init(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        let config = match config_path {
            Some(path) => load_config_file(path).await?,
            None => load_global_config(&data_dir).await,
        };
        Self::from_config(config, data_dir)
    }

    pub fn from_config(config: GlobalConfig, data_dir: PathBuf) -> anyhow::Result<Self> {
        let (gateway, search, local) = create_backends(&config)?.into_gateway();
        Ok(Self::with_gateway(config, gateway, search, local, data_dir))
    }

    /// Wire the in-memory services around an already-built gateway.
    pub fn with_gateway(
        config: GlobalConfig,
        gateway: ProviderGateway,
        search: Option<Arc<SearchAugmentedBackend>>,
        local: Option<Arc<LocalRuntimeBackend>>,
        data_dir: PathBuf,
    ) -> Self {
        let store = Arc::new(ConversationStore::new(&config.conversation));
        let cache = Arc::new(ResponseCache::new(&config.cache));
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        let context = Arc::new(ContextBuilder::new(Arc::clone(&store), &config.conversation));
        let orchestrator =
            ChatOrchestrator::new(store, cache, limiter, context, Arc::new(gateway));

        Self {
            config: Arc::new(config),
            orchestrator,
            search,
            local,
            data_dir,
        }
    }

    /// Start the background sweeps; they stop when `cancel` fires.
    pub fn spawn_maintenance(&self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        spawn_maintenance(
            &self.config,
            Arc::clone(self.orchestrator.store()),
            Arc::clone(self.orchestrator.cache()),
            Arc::clone(self.orchestrator.limiter()),
            cancel,
        )
    }

    pub fn gateway(&self) -> &ProviderGateway {
        self.orchestrator.gateway()
    }
}
