// crates/server/src/routes/evaluations.rs
//! Challenge evaluation endpoints.
//!
//! The snapshot endpoints poll the shared evaluation store; the stream
//! endpoint runs an evaluation live over SSE using the same code path as
//! the background job executor.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use skilldeck_core::events::{StreamEvent, DONE_SENTINEL};
use skilldeck_core::jobs::ChallengeEvaluationInput;
use tokio_util::sync::CancellationToken;

use crate::evaluations::EvaluationProgress;
use crate::jobs::executors::evaluation::evaluate_streaming;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateRequest {
    pub submission: String,
}

/// GET /api/evaluations/{challenge_id} - Latest evaluation snapshot, or
/// `null` when no run exists for the challenge.
async fn get_evaluation(
    State(state): State<AppState>,
    Path(challenge_id): Path<String>,
) -> Json<Option<EvaluationProgress>> {
    Json(state.evaluations.get(&challenge_id))
}

/// DELETE /api/evaluations/{challenge_id} - Discard the snapshot.
async fn delete_evaluation(
    State(state): State<AppState>,
    Path(challenge_id): Path<String>,
) -> StatusCode {
    if state.evaluations.delete(&challenge_id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// POST /api/evaluations/{challenge_id}/stream - Run an evaluation and
/// stream its events as SSE frames, terminated by `[DONE]`.
///
/// The run is detached from the connection: a dropped client does not
/// abort the evaluation, and the store keeps whatever was produced.
async fn stream_evaluation(
    State(state): State<AppState>,
    Path(challenge_id): Path<String>,
    Json(request): Json<EvaluateRequest>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<StreamEvent>();

    let input = ChallengeEvaluationInput {
        challenge_id,
        submission: request.submission,
    };
    tokio::spawn(async move {
        let result =
            evaluate_streaming(&state, &input, CancellationToken::new(), |event| {
                let _ = tx.send(event);
            })
            .await;
        if let Err(e) = result {
            tracing::warn!(challenge_id = %input.challenge_id, error = %e, "Evaluation stream failed");
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
        .route(
            "/evaluations/{challenge_id}",
            get(get_evaluation).delete(delete_evaluation),
        )
        .route("/evaluations/{challenge_id}/stream", post(stream_evaluation))
}
