//! Chat orchestration core for Colloquy.
//!
//! This crate holds the in-memory services (conversation store, response
//! cache, cooldown gate), prompt context construction, the `ChatBackend`
//! port that adapters in `colloquy-infra` implement, and the orchestrator
//! that streams a chat turn. It depends only on `colloquy-types` -- never on
//! `colloquy-infra` or any network crate.

pub mod cache;
pub mod chat;
pub mod context;
pub mod conversation;
pub mod llm;
pub mod maintenance;
pub mod rate_limit;
