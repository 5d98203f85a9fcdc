// crates/server/src/jobs/executors/evaluation.rs
//! Challenge evaluation executor.
//!
//! The provider streams its assessment as text lines. Plain lines are
//! feedback prose; JSON object lines are structured fields, and a JSON
//! object carrying `score`, `passed` and `feedback` is the final
//! verdict. `evaluate_streaming` is shared with the SSE route so the
//! live stream and the job result always see the same run.

use serde_json::json;
use tokio_util::sync::CancellationToken;

use skilldeck_core::ai::{extract_json_object, CompletionRequest};
use skilldeck_core::events::StreamEvent;
use skilldeck_core::jobs::ChallengeEvaluationInput;
use skilldeck_core::types::EvaluationResult;

use crate::jobs::executor::ExecutorError;
use crate::state::AppState;

const SYSTEM_PROMPT: &str = "You are grading a coding challenge submission. \
Stream your feedback as plain text lines, then finish with a single JSON object \
containing \"score\" (0-100), \"passed\" (boolean) and \"feedback\" (summary).";

pub async fn run(
    state: &AppState,
    job_id: &str,
    input: ChallengeEvaluationInput,
    cancel: CancellationToken,
) -> Result<serde_json::Value, ExecutorError> {
    tracing::debug!(job_id = %job_id, challenge_id = %input.challenge_id, "Evaluating submission");
    let result = evaluate_streaming(state, &input, cancel, |_| {}).await?;
    Ok(json!({ "evaluation": result }))
}

/// Run one evaluation, updating the evaluation store as output arrives
/// and handing each stream event to `on_event`.
pub async fn evaluate_streaming(
    state: &AppState,
    input: &ChallengeEvaluationInput,
    cancel: CancellationToken,
    mut on_event: impl FnMut(StreamEvent),
) -> Result<EvaluationResult, ExecutorError> {
    let challenge_id = &input.challenge_id;
    state.evaluations.begin(challenge_id);

    let request = CompletionRequest::new(format!(
        "Challenge: {challenge_id}\n\nSubmission:\n{}",
        input.submission
    ))
    .with_system(SYSTEM_PROMPT);

    let (mut rx, handle) = match state.ai.stream_complete(request) {
        Ok(pair) => pair,
        Err(e) => {
            state.evaluations.record_error(challenge_id, &e.to_string());
            on_event(StreamEvent::Error { message: e.to_string() });
            return Err(e.into());
        }
    };

    let mut line_buf = String::new();
    let mut feedback = String::new();
    let mut verdict: Option<EvaluationResult> = None;

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                state.evaluations.record_error(challenge_id, "evaluation cancelled");
                handle.abort();
                return Err(ExecutorError::Cancelled);
            }
            chunk = rx.recv() => match chunk {
                Some(chunk) => chunk,
                None => break,
            },
        };

        line_buf.push_str(&chunk);
        while let Some(pos) = line_buf.find('\n') {
            let line: String = line_buf.drain(..=pos).collect();
            consume_line(
                state,
                challenge_id,
                line.trim_end_matches('\n'),
                &mut feedback,
                &mut verdict,
                &mut on_event,
            );
        }
    }

    if !line_buf.is_empty() {
        consume_line(state, challenge_id, &line_buf, &mut feedback, &mut verdict, &mut on_event);
    }

    if let Err(e) = handle.await.map_err(|e| ExecutorError::InvalidResult(e.to_string()))? {
        state.evaluations.record_error(challenge_id, &e.to_string());
        on_event(StreamEvent::Error { message: e.to_string() });
        return Err(e.into());
    }

    let result = match verdict {
        Some(result) => result,
        None => {
            let msg = "provider produced no verdict".to_string();
            state.evaluations.record_error(challenge_id, &msg);
            on_event(StreamEvent::Error { message: msg.clone() });
            return Err(ExecutorError::InvalidResult(msg));
        }
    };

    let result = EvaluationResult {
        feedback: if result.feedback.is_empty() {
            feedback.trim().to_string()
        } else {
            result.feedback
        },
        ..result
    };

    state.evaluations.record_result(challenge_id, result.clone());
    on_event(StreamEvent::Result {
        fields: json!({
            "score": result.score,
            "passed": result.passed,
            "feedback": result.feedback,
        }),
    });
    Ok(result)
}

/// Classify one output line: final verdict, partial fields, or feedback
/// prose.
fn consume_line(
    state: &AppState,
    challenge_id: &str,
    line: &str,
    feedback: &mut String,
    verdict: &mut Option<EvaluationResult>,
    on_event: &mut impl FnMut(StreamEvent),
) {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return;
    }

    if trimmed.starts_with('{') {
        if let Some(object) = extract_json_object(trimmed) {
            if let Ok(result) = serde_json::from_value::<EvaluationResult>(object.clone()) {
                *verdict = Some(result);
                return;
            }
            state.evaluations.record_partial(challenge_id, object.clone());
            on_event(StreamEvent::Partial { fields: object });
            return;
        }
    }

    let chunk = format!("{trimmed}\n");
    state.evaluations.record_feedback(challenge_id, &chunk);
    feedback.push_str(&chunk);
    on_event(StreamEvent::FeedbackDelta { content: chunk });
}
