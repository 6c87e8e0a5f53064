//! Query parameter extractors for paged endpoints.

use serde::Deserialize;

/// Query parameters for the conversation history endpoint.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// 1-based page, most recent window first.
    #[serde(default = "default_page")]
    pub page: usize,
    /// Messages per page.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_page() -> usize {
    1
}

fn default_limit() -> usize {
    50
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
        }
    }
}
