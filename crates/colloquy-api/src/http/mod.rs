//! HTTP/REST API layer for Colloquy.
//!
//! Axum-based REST API at `/api/v1/` with an envelope response format for
//! resource endpoints, SSE for streaming chat, and CORS support.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod response;
pub mod router;
