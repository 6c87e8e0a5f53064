//! Prompt context construction.
//!
//! - `builder`: system prompt variant selection and context window trimming
//! - `language`: dominant-language detection (Czech / English / mixed)
//! - `topics`: keyword-table topic extraction
//! - `entities`: regex-based entity extraction

pub mod builder;
pub mod entities;
pub mod language;
pub mod topics;
