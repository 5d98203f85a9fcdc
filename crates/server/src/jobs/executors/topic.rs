// crates/server/src/jobs/executors/topic.rs
//! Topic regeneration executor: asks the provider for a fresh learning
//! topic distinct from the ones already on the board.

use serde_json::json;
use tokio_util::sync::CancellationToken;

use skilldeck_core::ai::{extract_json_object, CompletionRequest};
use skilldeck_core::jobs::TopicRegenerationInput;
use skilldeck_core::types::LearningTopic;

use crate::jobs::executor::ExecutorError;
use crate::state::AppState;

const SYSTEM_PROMPT: &str = "You suggest the next learning topic for a developer's \
dashboard. Respond with a single JSON object containing \"id\", \"title\" and \
optionally \"description\". Do not repeat any title already listed.";

pub async fn run(
    state: &AppState,
    job_id: &str,
    input: TopicRegenerationInput,
    cancel: CancellationToken,
) -> Result<serde_json::Value, ExecutorError> {
    let prompt = if input.existing_topic_titles.is_empty() {
        "No topics exist yet. Suggest a first topic.".to_string()
    } else {
        format!(
            "Topics already on the board:\n{}",
            input
                .existing_topic_titles
                .iter()
                .map(|t| format!("- {t}"))
                .collect::<Vec<_>>()
                .join("\n")
        )
    };

    let request = CompletionRequest::new(prompt).with_system(SYSTEM_PROMPT);
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::debug!(job_id = %job_id, "Topic regeneration cancelled");
            return Err(ExecutorError::Cancelled);
        }
        res = state.ai.complete(request) => res?,
    };

    let topic = parse_topic(&response.content)?;
    Ok(json!({ "learningTopic": topic }))
}

/// Pull the topic object out of the provider's text, which may surround
/// the JSON with prose.
fn parse_topic(text: &str) -> Result<LearningTopic, ExecutorError> {
    let object = extract_json_object(text)
        .ok_or_else(|| ExecutorError::InvalidResult("no JSON object in output".to_string()))?;

    let title = object
        .get("title")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ExecutorError::InvalidResult("topic has no title".to_string()))?
        .to_string();

    let id = object
        .get("id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let description = object
        .get("description")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    Ok(LearningTopic {
        id,
        title,
        description,
    })
}
