// crates/server/src/jobs/executors/chat.rs
//! Chat reply executor: generates an assistant reply for a conversation
//! and persists it to the thread store.

use serde_json::json;
use tokio_util::sync::CancellationToken;

use skilldeck_core::ai::CompletionRequest;
use skilldeck_core::jobs::ChatReplyInput;
use skilldeck_core::types::{ChatMessage, ChatRole};

use crate::jobs::executor::ExecutorError;
use crate::state::AppState;

const SYSTEM_PROMPT: &str = "You are a concise tutor inside a learning dashboard. \
Answer the learner's question directly, referencing earlier turns when relevant.";

pub async fn run(
    state: &AppState,
    job_id: &str,
    input: ChatReplyInput,
    cancel: CancellationToken,
) -> Result<serde_json::Value, ExecutorError> {
    let history = state.threads.history(&input.conversation_id);
    state
        .threads
        .append(&input.conversation_id, ChatMessage::user(&input.message));

    let request = CompletionRequest::new(build_prompt(&history, &input.message))
        .with_system(SYSTEM_PROMPT);

    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::debug!(job_id = %job_id, "Chat reply cancelled before completion");
            return Err(ExecutorError::Cancelled);
        }
        res = state.ai.complete(request) => res?,
    };

    state
        .threads
        .append(&input.conversation_id, ChatMessage::assistant(&response.content));

    Ok(json!({
        "reply": response.content,
        "messageCount": state.threads.message_count(&input.conversation_id),
    }))
}

/// Flatten prior turns plus the new message into a single prompt.
fn build_prompt(history: &[ChatMessage], message: &str) -> String {
    let mut prompt = String::new();
    for turn in history {
        let speaker = match turn.role {
            ChatRole::User => "Learner",
            ChatRole::Assistant => "Tutor",
        };
        prompt.push_str(speaker);
        prompt.push_str(": ");
        prompt.push_str(&turn.content);
        prompt.push('\n');
    }
    prompt.push_str("Learner: ");
    prompt.push_str(message);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use skilldeck_core::ai::ScriptedProvider;

    #[tokio::test]
    async fn test_run_persists_both_sides_of_the_turn() {
        let state = AppState::new(Arc::new(
            ScriptedProvider::new().push_response("Recursion is a function calling itself."),
        ));
        let input = ChatReplyInput {
            conversation_id: "c1".to_string(),
            message: "What is recursion?".to_string(),
        };

        let result = run(&state, "job-1", input, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result["reply"], "Recursion is a function calling itself.");
        assert_eq!(result["messageCount"], 2);

        let history = state.threads.history("c1");
        assert_eq!(history[0].role, ChatRole::User);
        assert_eq!(history[1].role, ChatRole::Assistant);
        assert_eq!(history[1].content, "Recursion is a function calling itself.");
    }

    #[tokio::test]
    async fn test_cancelled_run_skips_assistant_append() {
        let state = AppState::new(Arc::new(
            ScriptedProvider::new().push_response("never delivered"),
        ));
        let input = ChatReplyInput {
            conversation_id: "c1".to_string(),
            message: "hello".to_string(),
        };

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = run(&state, "job-1", input, cancel).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Cancelled));
        // The user's message is persisted, the reply is not
        assert_eq!(state.threads.message_count("c1"), 1);
    }

    #[test]
    fn test_build_prompt_includes_history() {
        let history = vec![
            ChatMessage::user("What is a closure?"),
            ChatMessage::assistant("A function capturing its environment."),
        ];
        let prompt = build_prompt(&history, "Show an example");
        assert!(prompt.contains("Learner: What is a closure?"));
        assert!(prompt.contains("Tutor: A function capturing its environment."));
        assert!(prompt.ends_with("Learner: Show an example"));
    }
}
