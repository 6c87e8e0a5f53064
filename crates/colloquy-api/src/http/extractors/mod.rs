//! Request extractors shared by the handlers.

pub mod client;
pub mod query;
