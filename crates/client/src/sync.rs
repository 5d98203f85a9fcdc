// crates/client/src/sync.rs
//! Optimistic pending markers and their reconciliation.
//!
//! When the UI submits a job it marks the affected resource pending so
//! views can render the optimistic state. A marker is cleared only when
//! the job is terminal AND the persisted resource reflects the expected
//! outcome; job status alone is not enough, because the job record can
//! reach the client before the resource write is visible. Jobs evicted
//! from the registry count as terminal.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use skilldeck_core::jobs::{Job, JobType};

use crate::error::ClientError;

/// One optimistic marker, keyed by the resource it covers.
#[derive(Debug, Clone)]
pub struct PendingMarker {
    pub job_id: String,
    pub job_type: JobType,
    pub target_id: String,
    pub created_at: DateTime<Utc>,
    /// Probe context recorded at submission time, e.g. the message count
    /// before a chat-reply job.
    pub details: Value,
}

impl PendingMarker {
    pub fn new(job_id: impl Into<String>, job_type: JobType, target_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            job_type,
            target_id: target_id.into(),
            created_at: Utc::now(),
            details: Value::Null,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// Where job status comes from during reconciliation.
#[async_trait]
pub trait JobStatusSource: Send + Sync {
    /// `None` means the job is unknown to the server (evicted or never
    /// existed), which reconciliation treats as terminal.
    async fn fetch_job(&self, job_id: &str) -> Result<Option<Job>, ClientError>;
}

/// Checks whether the persisted resource already shows the job's
/// expected outcome.
#[async_trait]
pub trait ResourceProbe: Send + Sync {
    async fn satisfied(&self, marker: &PendingMarker) -> Result<bool, ClientError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Job finished and the resource reflects it; marker removed.
    Cleared { target_id: String },
    /// Job failed; marker removed and the error surfaced.
    Failed { target_id: String, error: String },
    /// Marker stays.
    Kept { target_id: String, reason: KeptReason },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeptReason {
    JobActive,
    ResourceNotReady,
    Unreachable(String),
}

/// Pending markers for in-flight jobs, keyed by target resource id.
#[derive(Default)]
pub struct SyncState {
    markers: Mutex<HashMap<String, PendingMarker>>,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a marker, replacing any existing one for the same target.
    pub fn mark_pending(&self, marker: PendingMarker) {
        if let Ok(mut markers) = self.markers.lock() {
            markers.insert(marker.target_id.clone(), marker);
        }
    }

    pub fn is_pending(&self, target_id: &str) -> bool {
        self.markers
            .lock()
            .map(|markers| markers.contains_key(target_id))
            .unwrap_or(false)
    }

    pub fn pending(&self) -> Vec<PendingMarker> {
        self.markers
            .lock()
            .map(|markers| markers.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&self, target_id: &str) -> Option<PendingMarker> {
        self.markers
            .lock()
            .ok()
            .and_then(|mut markers| markers.remove(target_id))
    }

    /// Check every marker against job status and the persisted resource.
    ///
    /// Markers are snapshotted before any await; no lock is held across
    /// network calls.
    pub async fn reconcile(
        &self,
        jobs: &dyn JobStatusSource,
        probe: &dyn ResourceProbe,
    ) -> Vec<ReconcileOutcome> {
        let snapshot = self.pending();
        let mut outcomes = Vec::with_capacity(snapshot.len());

        for marker in snapshot {
            let outcome = self.reconcile_one(&marker, jobs, probe).await;
            if matches!(
                outcome,
                ReconcileOutcome::Cleared { .. } | ReconcileOutcome::Failed { .. }
            ) {
                self.clear(&marker.target_id);
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn reconcile_one(
        &self,
        marker: &PendingMarker,
        jobs: &dyn JobStatusSource,
        probe: &dyn ResourceProbe,
    ) -> ReconcileOutcome {
        let target_id = marker.target_id.clone();

        let job = match jobs.fetch_job(&marker.job_id).await {
            Ok(job) => job,
            Err(e) => {
                return ReconcileOutcome::Kept {
                    target_id,
                    reason: KeptReason::Unreachable(e.to_string()),
                }
            }
        };

        match job {
            Some(job) if !job.status.is_terminal() => ReconcileOutcome::Kept {
                target_id,
                reason: KeptReason::JobActive,
            },
            Some(job) if job.status == skilldeck_core::jobs::JobStatus::Failed => {
                ReconcileOutcome::Failed {
                    target_id,
                    error: job.error.unwrap_or_else(|| "job failed".to_string()),
                }
            }
            // Completed, or evicted from the registry
            _ => match probe.satisfied(marker).await {
                Ok(true) => ReconcileOutcome::Cleared { target_id },
                Ok(false) => ReconcileOutcome::Kept {
                    target_id,
                    reason: KeptReason::ResourceNotReady,
                },
                Err(e) => ReconcileOutcome::Kept {
                    target_id,
                    reason: KeptReason::Unreachable(e.to_string()),
                },
            },
        }
    }
}

/// Run reconciliation on a fixed interval until cancelled.
///
/// The returned token stops the loop; the handle resolves once the
/// current pass, if any, finishes.
pub fn spawn_poller(
    sync: Arc<SyncState>,
    jobs: Arc<dyn JobStatusSource>,
    probe: Arc<dyn ResourceProbe>,
    interval: Duration,
) -> (tokio::task::JoinHandle<()>, CancellationToken) {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = ticker.tick() => {
                    for outcome in sync.reconcile(jobs.as_ref(), probe.as_ref()).await {
                        match outcome {
                            ReconcileOutcome::Cleared { target_id } => {
                                tracing::debug!(%target_id, "Pending marker cleared");
                            }
                            ReconcileOutcome::Failed { target_id, error } => {
                                tracing::warn!(%target_id, %error, "Pending job failed");
                            }
                            ReconcileOutcome::Kept { .. } => {}
                        }
                    }
                }
            }
        }
    });
    (handle, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use skilldeck_core::jobs::JobStatus;

    struct MapJobs {
        jobs: HashMap<String, Job>,
    }

    #[async_trait]
    impl JobStatusSource for MapJobs {
        async fn fetch_job(&self, job_id: &str) -> Result<Option<Job>, ClientError> {
            Ok(self.jobs.get(job_id).cloned())
        }
    }

    struct FixedProbe(bool);

    #[async_trait]
    impl ResourceProbe for FixedProbe {
        async fn satisfied(&self, _marker: &PendingMarker) -> Result<bool, ClientError> {
            Ok(self.0)
        }
    }

    fn job(id: &str, status: JobStatus) -> Job {
        Job {
            id: id.to_string(),
            job_type: JobType::ChatReply,
            target_id: Some("c1".to_string()),
            status,
            input: json!({}),
            result: None,
            error: match status {
                JobStatus::Failed => Some("model overloaded".to_string()),
                _ => None,
            },
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    fn jobs_with(id: &str, status: JobStatus) -> MapJobs {
        let mut jobs = HashMap::new();
        jobs.insert(id.to_string(), job(id, status));
        MapJobs { jobs }
    }

    #[tokio::test]
    async fn test_active_job_keeps_marker() {
        let sync = SyncState::new();
        sync.mark_pending(PendingMarker::new("j1", JobType::ChatReply, "c1"));

        let outcomes = sync
            .reconcile(&jobs_with("j1", JobStatus::Running), &FixedProbe(true))
            .await;
        assert_eq!(
            outcomes[0],
            ReconcileOutcome::Kept {
                target_id: "c1".to_string(),
                reason: KeptReason::JobActive
            }
        );
        assert!(sync.is_pending("c1"));
    }

    #[tokio::test]
    async fn test_completed_job_alone_does_not_clear() {
        let sync = SyncState::new();
        sync.mark_pending(PendingMarker::new("j1", JobType::ChatReply, "c1"));

        // Job is terminal but the resource write is not visible yet
        let outcomes = sync
            .reconcile(&jobs_with("j1", JobStatus::Completed), &FixedProbe(false))
            .await;
        assert_eq!(
            outcomes[0],
            ReconcileOutcome::Kept {
                target_id: "c1".to_string(),
                reason: KeptReason::ResourceNotReady
            }
        );
        assert!(sync.is_pending("c1"));

        // Next pass sees the resource and clears
        let outcomes = sync
            .reconcile(&jobs_with("j1", JobStatus::Completed), &FixedProbe(true))
            .await;
        assert_eq!(
            outcomes[0],
            ReconcileOutcome::Cleared {
                target_id: "c1".to_string()
            }
        );
        assert!(!sync.is_pending("c1"));
    }

    #[tokio::test]
    async fn test_evicted_job_clears_when_resource_ready() {
        let sync = SyncState::new();
        sync.mark_pending(PendingMarker::new("j1", JobType::ChatReply, "c1"));

        let empty = MapJobs { jobs: HashMap::new() };
        let outcomes = sync.reconcile(&empty, &FixedProbe(true)).await;
        assert_eq!(
            outcomes[0],
            ReconcileOutcome::Cleared {
                target_id: "c1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_failed_job_clears_and_surfaces_error() {
        let sync = SyncState::new();
        sync.mark_pending(PendingMarker::new("j1", JobType::ChatReply, "c1"));

        let outcomes = sync
            .reconcile(&jobs_with("j1", JobStatus::Failed), &FixedProbe(false))
            .await;
        assert_eq!(
            outcomes[0],
            ReconcileOutcome::Failed {
                target_id: "c1".to_string(),
                error: "model overloaded".to_string()
            }
        );
        assert!(!sync.is_pending("c1"));
    }

    #[tokio::test]
    async fn test_unreachable_source_keeps_marker() {
        struct FailingJobs;

        #[async_trait]
        impl JobStatusSource for FailingJobs {
            async fn fetch_job(&self, _job_id: &str) -> Result<Option<Job>, ClientError> {
                Err(ClientError::TransportClosed)
            }
        }

        let sync = SyncState::new();
        sync.mark_pending(PendingMarker::new("j1", JobType::ChatReply, "c1"));

        let outcomes = sync.reconcile(&FailingJobs, &FixedProbe(true)).await;
        assert!(matches!(
            outcomes[0],
            ReconcileOutcome::Kept {
                reason: KeptReason::Unreachable(_),
                ..
            }
        ));
        assert!(sync.is_pending("c1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_clears_marker_once_resource_ready() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        // Resource becomes visible on the third poll
        struct EventualProbe(AtomicUsize);

        #[async_trait]
        impl ResourceProbe for EventualProbe {
            async fn satisfied(&self, _marker: &PendingMarker) -> Result<bool, ClientError> {
                Ok(self.0.fetch_add(1, Ordering::SeqCst) >= 2)
            }
        }

        let sync = Arc::new(SyncState::new());
        sync.mark_pending(PendingMarker::new("j1", JobType::ChatReply, "c1"));

        let jobs: Arc<dyn JobStatusSource> = Arc::new(jobs_with("j1", JobStatus::Completed));
        let probe: Arc<dyn ResourceProbe> = Arc::new(EventualProbe(AtomicUsize::new(0)));
        let (handle, cancel) =
            spawn_poller(Arc::clone(&sync), jobs, probe, Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(sync.is_pending("c1"));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!sync.is_pending("c1"));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_marker_replacement_keeps_latest_job() {
        let sync = SyncState::new();
        sync.mark_pending(PendingMarker::new("j1", JobType::ChatReply, "c1"));
        sync.mark_pending(
            PendingMarker::new("j2", JobType::ChatReply, "c1")
                .with_details(json!({"messageCountBefore": 4})),
        );

        let pending = sync.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].job_id, "j2");
        assert_eq!(pending[0].details["messageCountBefore"], 4);
    }
}
