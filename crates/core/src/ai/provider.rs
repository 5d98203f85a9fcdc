// crates/core/src/ai/provider.rs
//! AiProvider trait defining the interface for AI backends.

use async_trait::async_trait;

use super::types::{AiError, CompletionRequest, CompletionResponse};

/// Receiver half of a streamed completion: yields text chunks until the
/// backend finishes, then closes. The paired join handle resolves with the
/// backend's exit outcome.
pub type ChunkReceiver = tokio::sync::mpsc::Receiver<String>;

/// Trait for AI backends that executors and streaming endpoints call.
///
/// Implementations:
/// - `ClaudeCliProvider` — spawns the `claude` CLI process
/// - `ScriptedProvider` — deterministic responses for tests and demos
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Run a completion to... completion. Used by chat-reply and
    /// topic-regeneration executors.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, AiError>;

    /// Start a streamed completion. Chunks arrive on the receiver as the
    /// backend produces them; the join handle reports the final outcome.
    fn stream_complete(
        &self,
        request: CompletionRequest,
    ) -> Result<(ChunkReceiver, tokio::task::JoinHandle<Result<(), AiError>>), AiError>;

    /// Check whether the backend is reachable (CLI installed, etc.)
    async fn health_check(&self) -> Result<(), AiError>;

    /// Provider name for logging (e.g. "claude-cli", "scripted").
    fn name(&self) -> &str;

    /// Model identifier (e.g. "haiku", "sonnet").
    fn model(&self) -> &str;
}
