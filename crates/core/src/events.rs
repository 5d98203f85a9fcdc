// crates/core/src/events.rs
//! Stream-event envelope for the SSE chat/evaluation endpoints.
//!
//! Each SSE frame carries one JSON object tagged by a `type` field,
//! terminated by a literal `[DONE]` payload. The server emits these and
//! the client stream store parses them; both sides share this enum so the
//! wire format cannot drift.

use serde::{Deserialize, Serialize};

/// One event on a chat or evaluation stream.
///
/// Chat streams emit `delta`/`tool_start`/`tool_complete`/`meta`/`done`/
/// `error`; evaluation streams emit `partial`/`feedback-delta`/`result`/
/// `error`. Unknown payload shapes fail deserialization and are skipped
/// by the client rather than failing the whole stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum StreamEvent {
    /// Incremental assistant text.
    Delta { content: String },
    /// A tool invocation began.
    ToolStart {
        name: String,
        #[serde(default)]
        args: serde_json::Value,
    },
    /// A tool invocation finished.
    ToolComplete {
        name: String,
        #[serde(default)]
        result: serde_json::Value,
        #[serde(default)]
        duration_ms: u64,
    },
    /// Server-reported timing/session info, sent once near stream start.
    Meta(StreamMeta),
    /// Chat stream finished; carries the complete content for verification.
    Done {
        total_content: String,
        #[serde(default)]
        tool_calls: Vec<ToolInvocation>,
    },
    /// The stream failed server-side.
    Error { message: String },
    /// Evaluation progress snapshot (shape is evaluation-specific).
    Partial {
        #[serde(flatten)]
        fields: serde_json::Value,
    },
    /// Incremental evaluation feedback text.
    #[serde(rename = "feedback-delta")]
    FeedbackDelta { content: String },
    /// Final evaluation result.
    Result {
        #[serde(flatten)]
        fields: serde_json::Value,
    },
}

/// Timing/session metadata reported by the server on stream start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
}

/// Record of one tool invoked during a stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub name: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub args: serde_json::Value,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub result: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// The literal payload that terminates an SSE stream.
pub const DONE_SENTINEL: &str = "[DONE]";
