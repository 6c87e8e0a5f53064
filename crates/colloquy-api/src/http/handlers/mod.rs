//! HTTP request handlers.

pub mod backends;
pub mod cache;
pub mod chat;
pub mod conversation;
