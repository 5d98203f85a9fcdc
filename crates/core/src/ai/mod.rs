// crates/core/src/ai/mod.rs
//! AI backend seam for job executors and streaming endpoints.
//!
//! Provides the `AiProvider` trait plus two implementations: the
//! production `ClaudeCliProvider` (spawns the `claude` CLI) and the
//! deterministic `ScriptedProvider` used by tests and demos.

pub mod claude_cli;
pub mod provider;
pub mod scripted;
pub mod types;

pub use claude_cli::{extract_json_object, ClaudeCliProvider};
pub use provider::{AiProvider, ChunkReceiver};
pub use scripted::ScriptedProvider;
pub use types::{AiError, CompletionRequest, CompletionResponse};
