//! Conversation state management.

pub mod store;
