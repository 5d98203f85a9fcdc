// crates/server/src/jobs/executor.rs
//! Fire-and-forget job execution.
//!
//! `spawn_job` detaches a supervised task per job: every outcome, the
//! panic path included, lands in the registry as data. Nothing here ever
//! propagates an error to the spawning request handler.

use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use tokio_util::sync::CancellationToken;

use skilldeck_core::ai::AiError;
use skilldeck_core::jobs::JobOperation;

use crate::state::AppState;

/// Failure of one executor run. Converted to a string on the job record;
/// never surfaced as an HTTP error.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Ai(#[from] AiError),
    #[error("job cancelled")]
    Cancelled,
    #[error("malformed provider output: {0}")]
    InvalidResult(String),
}

/// Spawn the executor for a freshly created job and return immediately.
///
/// The spawned task owns the full lifecycle: it marks the job running,
/// runs the operation, and records the terminal status. A cancellation
/// token is registered so `DELETE /api/jobs/{id}` can abort the run.
pub fn spawn_job(state: AppState, job_id: String, operation: JobOperation) {
    let cancel = CancellationToken::new();
    state.registry.register_cancel(&job_id, cancel.clone());

    tokio::spawn(async move {
        state.registry.mark_running(&job_id);
        tracing::info!(job_id = %job_id, job_type = %operation.job_type(), "Job started");

        let run = AssertUnwindSafe(run_operation(&state, &job_id, operation, cancel))
            .catch_unwind()
            .await;

        match run {
            Ok(Ok(result)) => {
                state.registry.mark_completed(&job_id, result);
                tracing::info!(job_id = %job_id, "Job completed");
            }
            Ok(Err(e)) => {
                tracing::warn!(job_id = %job_id, error = %e, "Job failed");
                state.registry.mark_failed(&job_id, e.to_string());
            }
            Err(_) => {
                tracing::error!(job_id = %job_id, "Job executor panicked");
                state.registry.mark_failed(&job_id, "executor panicked");
            }
        }
    });
}

async fn run_operation(
    state: &AppState,
    job_id: &str,
    operation: JobOperation,
    cancel: CancellationToken,
) -> Result<serde_json::Value, ExecutorError> {
    match operation {
        JobOperation::ChatReply(input) => {
            super::executors::chat::run(state, job_id, input, cancel).await
        }
        JobOperation::ChallengeEvaluation(input) => {
            super::executors::evaluation::run(state, job_id, input, cancel).await
        }
        JobOperation::TopicRegeneration(input) => {
            super::executors::topic::run(state, job_id, input, cancel).await
        }
    }
}
