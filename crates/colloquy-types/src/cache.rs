//! Response cache result and statistics types.

use serde::{Deserialize, Serialize};

/// A cached response returned from a cache hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedResponse {
    pub response: String,
    pub from_cache: bool,
    pub hit_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Set when the hit came from word-set similarity rather than the exact key.
    #[serde(default)]
    pub fuzzy: bool,
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hit_count: u64,
    pub miss_count: u64,
    /// Hit rate in percent, `0.0` before any lookup.
    pub hit_rate: f64,
}

impl CacheStats {
    pub fn compute_hit_rate(hits: u64, misses: u64) -> f64 {
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64) * 100.0
        }
    }
}
