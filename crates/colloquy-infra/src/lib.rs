//! Infrastructure for Colloquy.
//!
//! Concrete [`ChatBackend`](colloquy_core::llm::backend::ChatBackend)
//! adapters for the hosted router, the local runtime and the
//! search-augmented service, plus `config.toml` loading.

pub mod config;
pub mod llm;
