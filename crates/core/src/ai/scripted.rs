// crates/core/src/ai/scripted.rs
//! Deterministic AI provider for tests and demos.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::provider::{AiProvider, ChunkReceiver};
use super::types::{AiError, CompletionRequest, CompletionResponse};

/// An `AiProvider` that replays canned responses in order.
///
/// Each queued response is consumed by one `complete` or
/// `stream_complete` call; streamed responses are delivered in
/// fixed-size chunks. An exhausted script returns
/// `AiError::NotAvailable`.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<String, String>>>,
    chunk_size: usize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            chunk_size: 8,
        }
    }

    /// Queue a successful response.
    pub fn push_response(self, content: impl Into<String>) -> Self {
        if let Ok(mut guard) = self.responses.lock() {
            guard.push_back(Ok(content.into()));
        }
        self
    }

    /// Queue a failure.
    pub fn push_error(self, message: impl Into<String>) -> Self {
        if let Ok(mut guard) = self.responses.lock() {
            guard.push_back(Err(message.into()));
        }
        self
    }

    /// Chunk size (in bytes, rounded to char boundaries) for streamed
    /// delivery.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    fn next_response(&self) -> Result<String, AiError> {
        let mut guard = self
            .responses
            .lock()
            .map_err(|_| AiError::Backend("scripted provider lock poisoned".to_string()))?;
        match guard.pop_front() {
            Some(Ok(content)) => Ok(content),
            Some(Err(message)) => Err(AiError::Backend(message)),
            None => Err(AiError::NotAvailable("script exhausted".to_string())),
        }
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Split text into chunks of roughly `size` bytes on char boundaries.
fn chunk_text(text: &str, size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if current.len() >= size {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[async_trait]
impl AiProvider for ScriptedProvider {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, AiError> {
        let content = self.next_response()?;
        Ok(CompletionResponse {
            content,
            latency_ms: 0,
        })
    }

    fn stream_complete(
        &self,
        _request: CompletionRequest,
    ) -> Result<(ChunkReceiver, tokio::task::JoinHandle<Result<(), AiError>>), AiError> {
        let content = self.next_response()?;
        let chunks = chunk_text(&content, self.chunk_size);
        let (tx, rx) = tokio::sync::mpsc::channel::<String>(64);

        let handle = tokio::spawn(async move {
            for chunk in chunks {
                if tx.send(chunk).await.is_err() {
                    return Ok(());
                }
            }
            Ok(())
        });

        Ok((rx, handle))
    }

    async fn health_check(&self) -> Result<(), AiError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted"
    }
}
