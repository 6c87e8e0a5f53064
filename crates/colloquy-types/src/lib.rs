//! Shared domain types for Colloquy.
//!
//! This crate contains the core domain types used across the Colloquy chat
//! service: conversations, backend messages and errors, stream events, cache
//! results, prompt context, configuration, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod cache;
pub mod chat;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod llm;
