// crates/core/src/ai/types.rs
//! Request/response/error types for AI backends.

use thiserror::Error;

/// Request for an AI completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: Option<String>,
    pub user_prompt: String,
}

impl CompletionRequest {
    pub fn new(user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: None,
            user_prompt: user_prompt.into(),
        }
    }

    pub fn with_system(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Combined prompt text for backends without a separate system slot.
    pub fn combined_prompt(&self) -> String {
        match &self.system_prompt {
            Some(system) => format!("{}\n\n{}", system, self.user_prompt),
            None => self.user_prompt.clone(),
        }
    }
}

/// Response from an AI completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub latency_ms: u64,
}

/// Errors from AI backends.
#[derive(Debug, Error)]
pub enum AiError {
    #[error("Failed to spawn AI process: {0}")]
    SpawnFailed(String),

    #[error("Backend returned error: {0}")]
    Backend(String),

    #[error("Failed to parse response: {0}")]
    ParseFailed(String),

    #[error("Provider not available: {0}")]
    NotAvailable(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_prompt_with_system() {
        let req = CompletionRequest::new("user part").with_system("system part");
        assert_eq!(req.combined_prompt(), "system part\n\nuser part");
    }

    #[test]
    fn test_combined_prompt_without_system() {
        let req = CompletionRequest::new("just the question");
        assert_eq!(req.combined_prompt(), "just the question");
    }

    #[test]
    fn test_ai_error_display() {
        let err = AiError::Timeout(30);
        assert_eq!(err.to_string(), "Timeout after 30 seconds");

        let err = AiError::SpawnFailed("command not found".to_string());
        assert_eq!(
            err.to_string(),
            "Failed to spawn AI process: command not found"
        );
    }
}
