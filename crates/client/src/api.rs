// crates/client/src/api.rs
//! Plain HTTP client for the job and evaluation endpoints.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use skilldeck_core::jobs::{
    CreateJobRequest, CreatedJob, Job, JobOperation, JobStatus, JobType, JobsResponse,
};
use skilldeck_core::types::ChatMessage;

use crate::error::ClientError;
use crate::sync::JobStatusSource;

/// Conversation history as served by `GET /api/chat/{id}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub messages: Vec<ChatMessage>,
    pub message_count: usize,
}

pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Submit a job. The server answers immediately with the pending
    /// descriptor.
    pub async fn submit_job(
        &self,
        operation: JobOperation,
        target_id: Option<String>,
    ) -> Result<CreatedJob, ClientError> {
        let body = CreateJobRequest {
            operation,
            target_id,
        };
        let response = self
            .client
            .post(self.url("/api/jobs"))
            .json(&body)
            .send()
            .await?;
        Ok(checked(response).await?.json().await?)
    }

    /// Fetch one job; `None` when the server no longer knows it.
    pub async fn get_job(&self, job_id: &str) -> Result<Option<Job>, ClientError> {
        let response = self
            .client
            .get(self.url(&format!("/api/jobs/{job_id}")))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(checked(response).await?.json().await?))
    }

    pub async fn list_jobs(
        &self,
        job_type: Option<JobType>,
        status: Option<JobStatus>,
    ) -> Result<Vec<Job>, ClientError> {
        let mut request = self.client.get(self.url("/api/jobs"));
        if let Some(job_type) = job_type {
            request = request.query(&[("type", job_type.as_str())]);
        }
        if let Some(status) = status {
            request = request.query(&[("status", status.as_str())]);
        }
        let response: JobsResponse = checked(request.send().await?).await?.json().await?;
        Ok(response.jobs)
    }

    /// Cancel a job; `None` when it was already gone.
    pub async fn cancel_job(&self, job_id: &str) -> Result<Option<Job>, ClientError> {
        let response = self
            .client
            .delete(self.url(&format!("/api/jobs/{job_id}")))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(checked(response).await?.json().await?))
    }

    pub async fn conversation(&self, conversation_id: &str) -> Result<ConversationView, ClientError> {
        let response = self
            .client
            .get(self.url(&format!("/api/chat/{conversation_id}")))
            .send()
            .await?;
        Ok(checked(response).await?.json().await?)
    }

    /// Latest evaluation snapshot; `None` when the server answers `null`
    /// because no run exists.
    pub async fn evaluation(&self, challenge_id: &str) -> Result<Option<Value>, ClientError> {
        let response = self
            .client
            .get(self.url(&format!("/api/evaluations/{challenge_id}")))
            .send()
            .await?;
        let value: Value = checked(response).await?.json().await?;
        Ok(if value.is_null() { None } else { Some(value) })
    }

    pub async fn delete_evaluation(&self, challenge_id: &str) -> Result<bool, ClientError> {
        let response = self
            .client
            .delete(self.url(&format!("/api/evaluations/{challenge_id}")))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        checked(response).await?;
        Ok(true)
    }

    pub async fn health(&self) -> Result<Value, ClientError> {
        let response = self.client.get(self.url("/api/health")).send().await?;
        Ok(checked(response).await?.json().await?)
    }
}

async fn checked(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(ClientError::Server {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl JobStatusSource for ApiClient {
    async fn fetch_job(&self, job_id: &str) -> Result<Option<Job>, ClientError> {
        self.get_job(job_id).await
    }
}
