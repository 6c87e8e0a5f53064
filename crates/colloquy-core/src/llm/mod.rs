//! Chat backend abstractions for Colloquy.
//!
//! This module defines the core traits and utilities for backend integration:
//! - `ChatBackend`: RPITIT trait for concrete backend implementations
//! - `BoxChatBackend`: Object-safe wrapper for dynamic dispatch
//! - `RetryPolicy`: bounded exponential backoff for transient rate limits
//! - `ProviderGateway`: model-hint routing and concurrent health probing

pub mod backend;
pub mod box_backend;
pub mod gateway;
pub mod retry;

#[cfg(test)]
pub mod testing;
