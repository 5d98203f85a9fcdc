// crates/server/src/evaluations.rs
//! Shared progress state for challenge evaluations.
//!
//! Evaluation runs stream partial output; this store holds the latest
//! snapshot per challenge so HTTP polling and the job result agree on
//! what the evaluation said. Writers are executors; readers are the
//! evaluation routes.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::Serialize;

use skilldeck_core::types::EvaluationResult;

/// Phase of an evaluation run for one challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationPhase {
    Idle,
    Streaming,
    Complete,
    Failed,
}

/// Snapshot of an evaluation run, serialized for the polling endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationProgress {
    /// Wire name is `status`.
    #[serde(rename = "status")]
    pub phase: EvaluationPhase,
    /// Structured partial fields seen so far (score bands, rubric hits).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<serde_json::Value>,
    /// Accumulated feedback text from `feedback-delta` frames.
    pub streaming_feedback: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<EvaluationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvaluationProgress {
    fn idle() -> Self {
        Self {
            phase: EvaluationPhase::Idle,
            partial: None,
            streaming_feedback: String::new(),
            result: None,
            error: None,
        }
    }
}

/// Per-challenge evaluation progress, keyed by challenge id.
#[derive(Default)]
pub struct EvaluationStore {
    runs: RwLock<HashMap<String, EvaluationProgress>>,
}

impl EvaluationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset a challenge to a fresh streaming run, discarding any prior
    /// snapshot.
    pub fn begin(&self, challenge_id: &str) {
        self.update(challenge_id, |run| {
            *run = EvaluationProgress::idle();
            run.phase = EvaluationPhase::Streaming;
        });
    }

    /// Merge structured partial fields into the snapshot.
    pub fn record_partial(&self, challenge_id: &str, fields: serde_json::Value) {
        self.update(challenge_id, |run| {
            match (&mut run.partial, fields) {
                (Some(serde_json::Value::Object(existing)), serde_json::Value::Object(new)) => {
                    for (k, v) in new {
                        existing.insert(k, v);
                    }
                }
                (slot, fields) => *slot = Some(fields),
            }
        });
    }

    /// Append a feedback text fragment.
    pub fn record_feedback(&self, challenge_id: &str, chunk: &str) {
        self.update(challenge_id, |run| {
            run.streaming_feedback.push_str(chunk);
        });
    }

    /// Record the final verdict and mark the run complete.
    pub fn record_result(&self, challenge_id: &str, result: EvaluationResult) {
        self.update(challenge_id, |run| {
            run.result = Some(result);
            run.phase = EvaluationPhase::Complete;
        });
    }

    /// Record a failure. Accumulated feedback is kept for display.
    pub fn record_error(&self, challenge_id: &str, message: &str) {
        self.update(challenge_id, |run| {
            run.error = Some(message.to_string());
            run.phase = EvaluationPhase::Failed;
        });
    }

    pub fn get(&self, challenge_id: &str) -> Option<EvaluationProgress> {
        match self.runs.read() {
            Ok(runs) => runs.get(challenge_id).cloned(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading evaluations: {e}");
                None
            }
        }
    }

    /// Drop the snapshot for a challenge. Returns whether one existed.
    pub fn delete(&self, challenge_id: &str) -> bool {
        match self.runs.write() {
            Ok(mut runs) => runs.remove(challenge_id).is_some(),
            Err(e) => {
                tracing::error!("RwLock poisoned deleting evaluation: {e}");
                false
            }
        }
    }

    fn update(&self, challenge_id: &str, f: impl FnOnce(&mut EvaluationProgress)) {
        match self.runs.write() {
            Ok(mut runs) => {
                let run = runs
                    .entry(challenge_id.to_string())
                    .or_insert_with(EvaluationProgress::idle);
                f(run);
            }
            Err(e) => tracing::error!("RwLock poisoned updating evaluation: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_streaming_run_accumulates() {
        let store = EvaluationStore::new();
        assert!(store.get("ch-1").is_none());

        store.begin("ch-1");
        store.record_partial("ch-1", json!({"score": 40}));
        store.record_partial("ch-1", json!({"score": 72, "rubric": "style"}));
        store.record_feedback("ch-1", "Good start. ");
        store.record_feedback("ch-1", "Consider edge cases.");

        let run = store.get("ch-1").unwrap();
        assert_eq!(run.phase, EvaluationPhase::Streaming);
        assert_eq!(run.partial.as_ref().unwrap()["score"], 72);
        assert_eq!(run.partial.as_ref().unwrap()["rubric"], "style");
        assert_eq!(run.streaming_feedback, "Good start. Consider edge cases.");

        store.record_result(
            "ch-1",
            EvaluationResult {
                score: 72.0,
                passed: true,
                feedback: "Solid work".to_string(),
            },
        );
        let run = store.get("ch-1").unwrap();
        assert_eq!(run.phase, EvaluationPhase::Complete);
        assert!(run.result.unwrap().passed);
    }

    #[test]
    fn test_begin_resets_previous_run() {
        let store = EvaluationStore::new();
        store.begin("ch-1");
        store.record_feedback("ch-1", "old feedback");
        store.record_error("ch-1", "timed out");

        store.begin("ch-1");
        let run = store.get("ch-1").unwrap();
        assert_eq!(run.phase, EvaluationPhase::Streaming);
        assert!(run.streaming_feedback.is_empty());
        assert!(run.error.is_none());
    }

    #[test]
    fn test_error_keeps_feedback() {
        let store = EvaluationStore::new();
        store.begin("ch-1");
        store.record_feedback("ch-1", "partial feedback");
        store.record_error("ch-1", "provider unavailable");

        let run = store.get("ch-1").unwrap();
        assert_eq!(run.phase, EvaluationPhase::Failed);
        assert_eq!(run.streaming_feedback, "partial feedback");
        assert_eq!(run.error.as_deref(), Some("provider unavailable"));
    }

    #[test]
    fn test_snapshot_serializes_status_field() {
        let store = EvaluationStore::new();
        store.begin("ch-1");
        store.record_feedback("ch-1", "ok\n");

        let json = serde_json::to_value(store.get("ch-1").unwrap()).unwrap();
        assert_eq!(json["status"], "streaming");
        assert!(json.get("phase").is_none());
        assert_eq!(json["streamingFeedback"], "ok\n");
    }

    #[test]
    fn test_delete() {
        let store = EvaluationStore::new();
        assert!(!store.delete("ch-1"));
        store.begin("ch-1");
        assert!(store.delete("ch-1"));
        assert!(store.get("ch-1").is_none());
    }
}
