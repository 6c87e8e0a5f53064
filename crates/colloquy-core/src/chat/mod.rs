//! Chat turn orchestration for Colloquy.
//!
//! `ChatOrchestrator` composes the conversation store, the response cache,
//! the cooldown gate, the context builder and the provider gateway into the
//! per-turn event stream. `state` holds the request state machine it logs.

pub mod orchestrator;
pub mod state;
