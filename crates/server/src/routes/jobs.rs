// crates/server/src/routes/jobs.rs
//! API routes for background job management.
//!
//! Submission is fire-and-forget: POST returns the pending descriptor
//! immediately and the executor runs detached. Clients poll GET until
//! the job is terminal.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use skilldeck_core::jobs::{CreateJobRequest, CreatedJob, Job, JobStatus, JobType, JobsResponse};

use crate::error::{ApiError, ApiResult};
use crate::jobs::spawn_job;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct JobsQuery {
    #[serde(rename = "type")]
    job_type: Option<String>,
    status: Option<String>,
}

/// POST /api/jobs - Submit a background job.
async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> (StatusCode, Json<CreatedJob>) {
    let job = state.registry.create(&request.operation, request.target_id);
    let created = CreatedJob {
        id: job.id.clone(),
        job_type: job.job_type,
        status: job.status,
        created_at: job.created_at,
    };
    spawn_job(state, job.id, request.operation);
    (StatusCode::ACCEPTED, Json(created))
}

/// GET /api/jobs - List jobs, optionally filtered by type and status.
async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobsQuery>,
) -> ApiResult<Json<JobsResponse>> {
    let type_filter = query
        .job_type
        .as_deref()
        .map(|raw| {
            raw.parse::<JobType>()
                .map_err(|_| ApiError::BadRequest(format!("unknown job type: {raw}")))
        })
        .transpose()?;
    let status_filter = query
        .status
        .as_deref()
        .map(|raw| {
            raw.parse::<JobStatus>()
                .map_err(|_| ApiError::BadRequest(format!("unknown job status: {raw}")))
        })
        .transpose()?;

    let jobs = state
        .registry
        .get_all()
        .into_iter()
        .filter(|job| type_filter.map(|t| job.job_type == t).unwrap_or(true))
        .filter(|job| status_filter.map(|s| job.status == s).unwrap_or(true))
        .collect();

    Ok(Json(JobsResponse { jobs }))
}

/// GET /api/jobs/{id} - Get one job.
async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Job>> {
    state
        .registry
        .get(&id)
        .map(Json)
        .ok_or(ApiError::JobNotFound(id))
}

/// DELETE /api/jobs/{id} - Cancel a running job and drop its record.
async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Job>> {
    state
        .registry
        .delete(&id)
        .map(Json)
        .ok_or(ApiError::JobNotFound(id))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs", post(create_job).get(list_jobs))
        .route("/jobs/{id}", get(get_job).delete(delete_job))
}
