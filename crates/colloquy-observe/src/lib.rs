//! Observability for Colloquy: tracing subscriber setup.

pub mod tracing_setup;
