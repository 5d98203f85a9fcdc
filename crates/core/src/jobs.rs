// crates/core/src/jobs.rs
//! Wire model for background jobs.
//!
//! A job is a tracked unit of asynchronous server-side work. Its status
//! lifecycle is strictly monotonic: `pending → running → {completed |
//! failed}`. Cancellation is modeled as deletion — a cancelled job simply
//! stops existing, no `cancelled` status is ever persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operation kind tag for a background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    ChatReply,
    ChallengeEvaluation,
    TopicRegeneration,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChatReply => "chat-reply",
            Self::ChallengeEvaluation => "challenge-evaluation",
            Self::TopicRegeneration => "topic-regeneration",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat-reply" => Ok(Self::ChatReply),
            "challenge-evaluation" => Ok(Self::ChallengeEvaluation),
            "topic-regeneration" => Ok(Self::TopicRegeneration),
            other => Err(format!("unknown job type: {other}")),
        }
    }
}

/// Status of a background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Input for a chat-reply job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReplyInput {
    pub conversation_id: String,
    pub message: String,
}

/// Input for a challenge-evaluation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeEvaluationInput {
    pub challenge_id: String,
    pub submission: String,
}

/// Input for a topic-regeneration job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicRegenerationInput {
    pub existing_topic_titles: Vec<String>,
}

/// A job request as a tagged union: the `type` discriminator selects the
/// variant, the `input` field carries the type-specific parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "input", rename_all = "kebab-case")]
pub enum JobOperation {
    ChatReply(ChatReplyInput),
    ChallengeEvaluation(ChallengeEvaluationInput),
    TopicRegeneration(TopicRegenerationInput),
}

impl JobOperation {
    pub fn job_type(&self) -> JobType {
        match self {
            Self::ChatReply(_) => JobType::ChatReply,
            Self::ChallengeEvaluation(_) => JobType::ChallengeEvaluation,
            Self::TopicRegeneration(_) => JobType::TopicRegeneration,
        }
    }

    /// The type-specific input payload as JSON, for storage on the job.
    pub fn input_value(&self) -> serde_json::Value {
        let result = match self {
            Self::ChatReply(input) => serde_json::to_value(input),
            Self::ChallengeEvaluation(input) => serde_json::to_value(input),
            Self::TopicRegeneration(input) => serde_json::to_value(input),
        };
        result.unwrap_or(serde_json::Value::Null)
    }
}

/// A tracked unit of server-side async work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    pub status: JobStatus,
    pub input: serde_json::Value,
    /// Present only when `status == Completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Present only when `status == Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Request body for `POST /api/jobs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    #[serde(flatten)]
    pub operation: JobOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
}

/// Response body for `POST /api/jobs` — always `status: "pending"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedJob {
    pub id: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

/// Response body for `GET /api/jobs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsResponse {
    pub jobs: Vec<Job>,
}
