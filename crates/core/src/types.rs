// crates/core/src/types.rs
//! Domain types shared by the server and client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A learning topic suggested to the user (e.g. by topic regeneration).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningTopic {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Role of a chat message within a conversation thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// A single message in a conversation thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Set when a streamed reply was aborted mid-flight and the partial
    /// content was persisted anyway.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub interrupted: bool,
}

impl ChatMessage {
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            created_at: Utc::now(),
            interrupted: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            created_at: Utc::now(),
            interrupted: false,
        }
    }
}

/// Final outcome of a challenge evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    /// Score in the 0.0–100.0 range.
    pub score: f64,
    pub passed: bool,
    pub feedback: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_serializes_camel_case() {
        let msg = ChatMessage::assistant("hello");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"createdAt\""));
        assert!(json.contains("\"role\":\"assistant\""));
        // interrupted=false is omitted from the wire
        assert!(!json.contains("interrupted"));
    }

    #[test]
    fn test_chat_message_interrupted_round_trip() {
        let mut msg = ChatMessage::assistant("partial answer");
        msg.interrupted = true;
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"interrupted\":true"));

        let back: ChatMessage = serde_json::from_str(&json).unwrap();
        assert!(back.interrupted);
    }

    #[test]
    fn test_learning_topic_optional_description() {
        let json = r#"{"id":"t1","title":"Ownership in Rust"}"#;
        let topic: LearningTopic = serde_json::from_str(json).unwrap();
        assert_eq!(topic.id, "t1");
        assert!(topic.description.is_none());
    }

    #[test]
    fn test_evaluation_result_round_trip() {
        let result = EvaluationResult {
            score: 87.5,
            passed: true,
            feedback: "Solid error handling".to_string(),
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"score\":87.5"));
        let back: EvaluationResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }
}
