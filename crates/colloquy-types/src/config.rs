//! Global configuration types for Colloquy.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls the
//! HTTP listener, conversation retention, caching, cooldowns, retry policy,
//! and the set of chat backends.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::llm::BackendKind;

/// Top-level configuration for the Colloquy service.
///
/// Loaded from `~/.colloquy/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub backends: BackendsConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Conversation retention and context window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Turns kept per conversation; the raw message bound is twice this.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// Messages handed to the backend per request.
    #[serde(default = "default_context_messages")]
    pub context_messages: usize,
    /// Conversations idle longer than this are swept.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_conversation_sweep_secs")]
    pub sweep_interval_secs: u64,
}

fn default_max_turns() -> usize {
    20
}

fn default_context_messages() -> usize {
    20
}

fn default_idle_timeout_secs() -> u64 {
    24 * 60 * 60
}

fn default_conversation_sweep_secs() -> u64 {
    60 * 60
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            context_messages: default_context_messages(),
            idle_timeout_secs: default_idle_timeout_secs(),
            sweep_interval_secs: default_conversation_sweep_secs(),
        }
    }
}

/// How the orchestrator consults the response cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheLookupPolicy {
    /// Exact key match only.
    #[default]
    Exact,
    /// Exact key, then word-set similarity on a miss.
    ExactThenFuzzy,
    /// Never read from the cache. Successful responses are still written.
    Disabled,
}

impl fmt::Display for CacheLookupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheLookupPolicy::Exact => write!(f, "exact"),
            CacheLookupPolicy::ExactThenFuzzy => write!(f, "exact_then_fuzzy"),
            CacheLookupPolicy::Disabled => write!(f, "disabled"),
        }
    }
}

impl FromStr for CacheLookupPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exact" => Ok(CacheLookupPolicy::Exact),
            "exact_then_fuzzy" => Ok(CacheLookupPolicy::ExactThenFuzzy),
            "disabled" => Ok(CacheLookupPolicy::Disabled),
            other => Err(format!("invalid cache lookup policy: '{other}'")),
        }
    }
}

/// Response cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_max_size")]
    pub max_size: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_cache_cleanup_secs")]
    pub cleanup_interval_secs: u64,
    /// Responses shorter than this (in characters) are never stored.
    #[serde(default = "default_min_response_len")]
    pub min_response_len: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default)]
    pub lookup: CacheLookupPolicy,
}

fn default_cache_max_size() -> usize {
    100
}

fn default_cache_ttl_secs() -> u64 {
    5 * 60
}

fn default_cache_cleanup_secs() -> u64 {
    10 * 60
}

fn default_min_response_len() -> usize {
    10
}

fn default_similarity_threshold() -> f64 {
    0.7
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: default_cache_max_size(),
            ttl_secs: default_cache_ttl_secs(),
            cleanup_interval_secs: default_cache_cleanup_secs(),
            min_response_len: default_min_response_len(),
            similarity_threshold: default_similarity_threshold(),
            lookup: CacheLookupPolicy::default(),
        }
    }
}

/// Per-client cooldown settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// How often stale cooldown records are pruned.
    #[serde(default = "default_prune_secs")]
    pub prune_interval_secs: u64,
}

fn default_cooldown_ms() -> u64 {
    3_000
}

fn default_prune_secs() -> u64 {
    5 * 60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: default_cooldown_ms(),
            prune_interval_secs: default_prune_secs(),
        }
    }
}

/// Exponential backoff for transient rate limiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Longest single wait. A server hint above this ends the retries.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    16_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Backend selection and per-backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendsConfig {
    /// Order in which `auto` routing tries backends.
    #[serde(default = "default_priority")]
    pub priority: Vec<BackendKind>,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

fn default_priority() -> Vec<BackendKind> {
    vec![
        BackendKind::RemoteRouter,
        BackendKind::SearchAugmented,
        BackendKind::LocalRuntime,
    ]
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            priority: default_priority(),
            router: RouterConfig::default(),
            local: LocalConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Hosted OpenAI-compatible multi-model router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_router_url")]
    pub base_url: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_router_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_router_model")]
    pub default_model: String,
    /// Model ids this backend claims. Ids containing `/` are always claimed.
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default = "default_remote_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_router_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_router_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}

fn default_router_model() -> String {
    "meta-llama/llama-3.3-70b-instruct:free".to_string()
}

fn default_remote_timeout_secs() -> u64 {
    60
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_router_url(),
            api_key_env: default_router_key_env(),
            default_model: default_router_model(),
            models: Vec::new(),
            timeout_secs: default_remote_timeout_secs(),
        }
    }
}

/// Local inference runtime (Ollama-style).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_local_url")]
    pub base_url: String,
    #[serde(default = "default_local_model")]
    pub default_model: String,
    /// Send structured `{role, content}` turns instead of a flattened prompt.
    #[serde(default)]
    pub structured_turns: bool,
    #[serde(default = "default_local_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_local_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_local_model() -> String {
    "llama3.2".to_string()
}

fn default_local_timeout_secs() -> u64 {
    120
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_local_url(),
            default_model: default_local_model(),
            structured_turns: false,
            timeout_secs: default_local_timeout_secs(),
        }
    }
}

/// A named model variant offered by the search-augmented service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchVariant {
    pub name: String,
    pub model: String,
    /// Lightweight variants never return citations or images.
    #[serde(default)]
    pub lightweight: bool,
}

/// Hosted search-augmented service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_search_url")]
    pub base_url: String,
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,
    /// Name of the variant active at startup.
    #[serde(default = "default_search_variant")]
    pub default_variant: String,
    #[serde(default = "default_search_variants")]
    pub variants: Vec<SearchVariant>,
    #[serde(default = "default_remote_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_search_url() -> String {
    "https://api.perplexity.ai".to_string()
}

fn default_search_key_env() -> String {
    "PERPLEXITY_API_KEY".to_string()
}

fn default_search_variant() -> String {
    "sonar".to_string()
}

fn default_search_variants() -> Vec<SearchVariant> {
    vec![
        SearchVariant {
            name: "sonar".to_string(),
            model: "sonar".to_string(),
            lightweight: true,
        },
        SearchVariant {
            name: "sonar-pro".to_string(),
            model: "sonar-pro".to_string(),
            lightweight: false,
        },
        SearchVariant {
            name: "sonar-reasoning".to_string(),
            model: "sonar-reasoning".to_string(),
            lightweight: false,
        },
    ]
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_search_url(),
            api_key_env: default_search_key_env(),
            default_variant: default_search_variant(),
            variants: default_search_variants(),
            timeout_secs: default_remote_timeout_secs(),
        }
    }
}
