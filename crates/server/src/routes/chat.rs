// crates/server/src/routes/chat.rs
//! Conversation endpoints.
//!
//! The stream endpoint delivers the assistant reply as SSE deltas.
//! Generation runs in a detached task that persists the reply when the
//! provider finishes, so a client that aborts the stream still gets the
//! full message on its next history fetch.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use skilldeck_core::ai::CompletionRequest;
use skilldeck_core::events::{StreamEvent, StreamMeta, DONE_SENTINEL};
use skilldeck_core::types::ChatMessage;

use crate::state::AppState;

const SYSTEM_PROMPT: &str = "You are a concise tutor inside a learning dashboard. \
Answer the learner's question directly, referencing earlier turns when relevant.";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStreamRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResponse {
    pub messages: Vec<ChatMessage>,
    pub message_count: usize,
}

/// GET /api/chat/{conversation_id} - Full conversation history.
async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Json<ConversationResponse> {
    let messages = state.threads.history(&conversation_id);
    let message_count = messages.len();
    Json(ConversationResponse {
        messages,
        message_count,
    })
}

/// POST /api/chat/{conversation_id}/stream - Stream an assistant reply.
async fn stream_chat(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Json(request): Json<ChatStreamRequest>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<StreamEvent>();

    tokio::spawn(async move {
        let _ = tx.send(StreamEvent::Meta(StreamMeta {
            session_id: Some(conversation_id.clone()),
            model: Some(state.ai.model().to_string()),
            started_at: Some(chrono::Utc::now().to_rfc3339()),
        }));

        state
            .threads
            .append(&conversation_id, ChatMessage::user(&request.message));

        let completion = CompletionRequest::new(&request.message).with_system(SYSTEM_PROMPT);
        let (mut chunks, handle) = match state.ai.stream_complete(completion) {
            Ok(pair) => pair,
            Err(e) => {
                let _ = tx.send(StreamEvent::Error { message: e.to_string() });
                return;
            }
        };

        let mut total_content = String::new();
        while let Some(chunk) = chunks.recv().await {
            total_content.push_str(&chunk);
            let _ = tx.send(StreamEvent::Delta { content: chunk });
        }

        match handle.await {
            Ok(Ok(())) => {
                state
                    .threads
                    .append(&conversation_id, ChatMessage::assistant(&total_content));
                let _ = tx.send(StreamEvent::Done {
                    total_content,
                    tool_calls: Vec::new(),
                });
            }
            Ok(Err(e)) => {
                // Keep the partial reply, flagged as interrupted
                if !total_content.is_empty() {
                    let mut message = ChatMessage::assistant(&total_content);
                    message.interrupted = true;
                    state.threads.append(&conversation_id, message);
                }
                let _ = tx.send(StreamEvent::Error { message: e.to_string() });
            }
            Err(e) => {
                tracing::error!(error = %e, "Chat stream task failed");
                let _ = tx.send(StreamEvent::Error {
                    message: "stream task failed".to_string(),
                });
            }
        }
    });

    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let json = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(Event::default().data(json));
        }
        yield Ok(Event::default().data(DONE_SENTINEL));
    };

    Sse::new(stream)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chat/{conversation_id}", get(get_conversation))
        .route("/chat/{conversation_id}/stream", post(stream_chat))
}
