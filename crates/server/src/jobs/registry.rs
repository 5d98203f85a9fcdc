// crates/server/src/jobs/registry.rs
//! In-memory job registry with a monotonic status lifecycle.
//!
//! Pure data + transitions: the registry performs no I/O. Executors are
//! the only writers of status; route handlers read snapshots. All
//! operations on unknown ids are silent no-ops — callers treat `None` as
//! "job vanished" and stop polling.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use skilldeck_core::jobs::{Job, JobOperation, JobStatus, JobType};

/// Tuning knobs for registry garbage collection.
#[derive(Debug, Clone)]
pub struct JobRegistryConfig {
    /// Capacity bound: terminal jobs are evicted oldest-first once the
    /// registry grows past this.
    pub max_jobs: usize,
    /// Age bound: terminal jobs older than this (by `completed_at`) are
    /// evicted regardless of capacity.
    pub terminal_ttl: Duration,
}

impl Default for JobRegistryConfig {
    fn default() -> Self {
        Self {
            max_jobs: 100,
            terminal_ttl: Duration::from_secs(60 * 60),
        }
    }
}

/// Registry entry: the job plus a monotonic insertion sequence used for
/// deterministic oldest-first eviction.
struct JobEntry {
    job: Job,
    seq: u64,
}

/// In-memory store of background work items.
///
/// A single map guarded by a `std::sync::RwLock`; the lock is never held
/// across an await point, so status transitions are linearizable per job.
pub struct JobRegistry {
    entries: RwLock<HashMap<String, JobEntry>>,
    cancels: RwLock<HashMap<String, CancellationToken>>,
    next_seq: RwLock<u64>,
    config: JobRegistryConfig,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::with_config(JobRegistryConfig::default())
    }

    pub fn with_config(config: JobRegistryConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            cancels: RwLock::new(HashMap::new()),
            next_seq: RwLock::new(0),
            config,
        }
    }

    /// Insert a new pending job. Runs capacity cleanup first so the
    /// registry never grows without bound.
    pub fn create(&self, operation: &JobOperation, target_id: Option<String>) -> Job {
        self.cleanup();

        let job = Job {
            id: uuid::Uuid::new_v4().to_string(),
            job_type: operation.job_type(),
            target_id,
            status: JobStatus::Pending,
            input: operation.input_value(),
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };

        let seq = match self.next_seq.write() {
            Ok(mut guard) => {
                *guard += 1;
                *guard
            }
            Err(e) => {
                tracing::error!("RwLock poisoned taking job seq: {e}");
                0
            }
        };

        match self.entries.write() {
            Ok(mut entries) => {
                entries.insert(job.id.clone(), JobEntry { job: job.clone(), seq });
            }
            Err(e) => tracing::error!("RwLock poisoned inserting job: {e}"),
        }
        job
    }

    /// Transition a pending job to running. No-op on unknown ids and on
    /// jobs already past pending (transitions never reverse).
    pub fn mark_running(&self, id: &str) -> Option<Job> {
        self.mutate(id, |job| {
            if job.status == JobStatus::Pending {
                job.status = JobStatus::Running;
                job.started_at = Some(Utc::now());
            }
        })
    }

    /// Record a successful outcome. No-op if the job is already terminal.
    pub fn mark_completed(&self, id: &str, result: serde_json::Value) -> Option<Job> {
        let updated = self.mutate(id, |job| {
            if !job.status.is_terminal() {
                job.status = JobStatus::Completed;
                job.result = Some(result.clone());
                job.completed_at = Some(Utc::now());
            }
        });
        self.drop_cancel(id);
        updated
    }

    /// Record a failure. No-op if the job is already terminal.
    pub fn mark_failed(&self, id: &str, error: impl Into<String>) -> Option<Job> {
        let error = error.into();
        let updated = self.mutate(id, |job| {
            if !job.status.is_terminal() {
                job.status = JobStatus::Failed;
                job.error = Some(error.clone());
                job.completed_at = Some(Utc::now());
            }
        });
        self.drop_cancel(id);
        updated
    }

    pub fn get(&self, id: &str) -> Option<Job> {
        match self.entries.read() {
            Ok(entries) => entries.get(id).map(|e| e.job.clone()),
            Err(e) => {
                tracing::error!("RwLock poisoned reading jobs: {e}");
                None
            }
        }
    }

    pub fn get_by_type(&self, job_type: JobType) -> Vec<Job> {
        self.collect(|job| job.job_type == job_type)
    }

    /// Pending and running jobs.
    pub fn get_active(&self) -> Vec<Job> {
        self.collect(|job| !job.status.is_terminal())
    }

    pub fn get_all(&self) -> Vec<Job> {
        self.collect(|_| true)
    }

    /// Remove a job from visibility. This is the cancellation surface:
    /// the job's cancellation token is triggered so an in-flight executor
    /// aborts at its next suspension point, and subsequent reads see
    /// "not found".
    pub fn delete(&self, id: &str) -> Option<Job> {
        if let Ok(cancels) = self.cancels.read() {
            if let Some(token) = cancels.get(id) {
                token.cancel();
            }
        }
        self.drop_cancel(id);
        match self.entries.write() {
            Ok(mut entries) => entries.remove(id).map(|e| e.job),
            Err(e) => {
                tracing::error!("RwLock poisoned deleting job: {e}");
                None
            }
        }
    }

    /// Associate a cancellation token with a job so `delete` can abort
    /// its executor.
    pub fn register_cancel(&self, id: &str, token: CancellationToken) {
        match self.cancels.write() {
            Ok(mut cancels) => {
                cancels.insert(id.to_string(), token);
            }
            Err(e) => tracing::error!("RwLock poisoned registering cancel token: {e}"),
        }
    }

    /// Evict stale terminal jobs: first by age (`terminal_ttl` past
    /// `completed_at`), then oldest-created-first until under the
    /// capacity bound. Non-terminal jobs are never evicted.
    pub fn cleanup(&self) -> usize {
        let ttl = chrono::Duration::from_std(self.config.terminal_ttl)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        let cutoff = Utc::now() - ttl;
        let mut evicted = 0;

        match self.entries.write() {
            Ok(mut entries) => {
                let before = entries.len();
                entries.retain(|_, entry| {
                    !(entry.job.status.is_terminal()
                        && entry.job.completed_at.map(|t| t < cutoff).unwrap_or(false))
                });
                evicted += before - entries.len();

                if entries.len() > self.config.max_jobs {
                    let mut terminal: Vec<(String, u64)> = entries
                        .iter()
                        .filter(|(_, entry)| entry.job.status.is_terminal())
                        .map(|(id, entry)| (id.clone(), entry.seq))
                        .collect();
                    terminal.sort_by_key(|(_, seq)| *seq);

                    for (id, _) in terminal {
                        if entries.len() <= self.config.max_jobs {
                            break;
                        }
                        entries.remove(&id);
                        evicted += 1;
                    }
                }
            }
            Err(e) => tracing::error!("RwLock poisoned during cleanup: {e}"),
        }

        if evicted > 0 {
            tracing::debug!(evicted, "Job registry cleanup");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        match self.entries.read() {
            Ok(entries) => entries.len(),
            Err(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn mutate(&self, id: &str, f: impl FnOnce(&mut Job)) -> Option<Job> {
        match self.entries.write() {
            Ok(mut entries) => entries.get_mut(id).map(|entry| {
                f(&mut entry.job);
                entry.job.clone()
            }),
            Err(e) => {
                tracing::error!("RwLock poisoned mutating job: {e}");
                None
            }
        }
    }

    fn collect(&self, filter: impl Fn(&Job) -> bool) -> Vec<Job> {
        match self.entries.read() {
            Ok(entries) => {
                let mut matched: Vec<(u64, Job)> = entries
                    .values()
                    .filter(|entry| filter(&entry.job))
                    .map(|entry| (entry.seq, entry.job.clone()))
                    .collect();
                // Newest first for listing
                matched.sort_by(|a, b| b.0.cmp(&a.0));
                matched.into_iter().map(|(_, job)| job).collect()
            }
            Err(e) => {
                tracing::error!("RwLock poisoned reading jobs: {e}");
                Vec::new()
            }
        }
    }

    fn drop_cancel(&self, id: &str) {
        if let Ok(mut cancels) = self.cancels.write() {
            cancels.remove(id);
        }
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use skilldeck_core::jobs::TopicRegenerationInput;

    fn topic_op() -> JobOperation {
        JobOperation::TopicRegeneration(TopicRegenerationInput {
            existing_topic_titles: vec!["A".to_string()],
        })
    }

    #[test]
    fn test_create_stores_pending_job() {
        let registry = JobRegistry::new();
        let job = registry.create(&topic_op(), Some("focus-1".to_string()));

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.job_type, JobType::TopicRegeneration);
        assert_eq!(job.target_id.as_deref(), Some("focus-1"));
        assert_eq!(job.input["existingTopicTitles"][0], "A");
        assert!(job.started_at.is_none());

        let fetched = registry.get(&job.id).unwrap();
        assert_eq!(fetched, job);
    }

    #[test]
    fn test_lifecycle_is_monotonic() {
        let registry = JobRegistry::new();
        let job = registry.create(&topic_op(), None);

        let running = registry.mark_running(&job.id).unwrap();
        assert_eq!(running.status, JobStatus::Running);
        assert!(running.started_at.is_some());

        let done = registry
            .mark_completed(&job.id, serde_json::json!({"ok": true}))
            .unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.completed_at.is_some());

        // Terminal states never change
        let after_fail = registry.mark_failed(&job.id, "late error").unwrap();
        assert_eq!(after_fail.status, JobStatus::Completed);
        assert!(after_fail.error.is_none());

        let after_rerun = registry.mark_running(&job.id).unwrap();
        assert_eq!(after_rerun.status, JobStatus::Completed);
    }

    #[test]
    fn test_unknown_ids_are_silent() {
        let registry = JobRegistry::new();
        assert!(registry.get("nope").is_none());
        assert!(registry.mark_running("nope").is_none());
        assert!(registry.mark_completed("nope", serde_json::json!(1)).is_none());
        assert!(registry.mark_failed("nope", "x").is_none());
        assert!(registry.delete("nope").is_none());
    }

    #[test]
    fn test_get_active_excludes_terminal() {
        let registry = JobRegistry::new();
        let a = registry.create(&topic_op(), None);
        let b = registry.create(&topic_op(), None);
        registry.mark_running(&b.id);
        let c = registry.create(&topic_op(), None);
        registry.mark_running(&c.id);
        registry.mark_failed(&c.id, "boom");

        let active: Vec<String> = registry.get_active().into_iter().map(|j| j.id).collect();
        assert_eq!(active.len(), 2);
        assert!(active.contains(&a.id));
        assert!(active.contains(&b.id));
    }

    #[test]
    fn test_cleanup_capacity_bound_keeps_most_recent() {
        let registry = JobRegistry::with_config(JobRegistryConfig {
            max_jobs: 100,
            terminal_ttl: Duration::from_secs(3600),
        });

        let mut ids = Vec::new();
        for _ in 0..150 {
            let job = registry.create(&topic_op(), None);
            registry.mark_running(&job.id);
            registry.mark_completed(&job.id, serde_json::json!({}));
            ids.push(job.id);
        }

        registry.cleanup();
        assert_eq!(registry.len(), 100);

        // The 100 most recently created survive
        for id in &ids[50..] {
            assert!(registry.get(id).is_some(), "expected {id} retained");
        }
        for id in &ids[..50] {
            assert!(registry.get(id).is_none(), "expected {id} evicted");
        }
    }

    #[test]
    fn test_cleanup_never_evicts_active_jobs() {
        let registry = JobRegistry::with_config(JobRegistryConfig {
            max_jobs: 10,
            terminal_ttl: Duration::ZERO,
        });

        let mut active_ids = Vec::new();
        for _ in 0..20 {
            active_ids.push(registry.create(&topic_op(), None).id);
        }
        registry.cleanup();
        // Over capacity, but nothing is terminal — all retained
        assert_eq!(registry.len(), 20);
        for id in &active_ids {
            assert!(registry.get(id).is_some());
        }
    }

    #[test]
    fn test_cleanup_ttl_evicts_old_terminal_jobs() {
        let registry = JobRegistry::with_config(JobRegistryConfig {
            max_jobs: 100,
            terminal_ttl: Duration::ZERO,
        });

        let job = registry.create(&topic_op(), None);
        registry.mark_running(&job.id);
        registry.mark_completed(&job.id, serde_json::json!({}));

        registry.cleanup();
        assert!(registry.get(&job.id).is_none());
    }

    #[test]
    fn test_delete_cancels_registered_token() {
        let registry = JobRegistry::new();
        let job = registry.create(&topic_op(), None);

        let token = CancellationToken::new();
        registry.register_cancel(&job.id, token.clone());
        assert!(!token.is_cancelled());

        let deleted = registry.delete(&job.id).unwrap();
        assert_eq!(deleted.id, job.id);
        assert!(token.is_cancelled());
        assert!(registry.get(&job.id).is_none());
    }

    #[test]
    fn test_get_by_type_filters() {
        let registry = JobRegistry::new();
        registry.create(&topic_op(), None);
        registry.create(
            &JobOperation::ChatReply(skilldeck_core::jobs::ChatReplyInput {
                conversation_id: "c1".to_string(),
                message: "hi".to_string(),
            }),
            None,
        );

        assert_eq!(registry.get_by_type(JobType::TopicRegeneration).len(), 1);
        assert_eq!(registry.get_by_type(JobType::ChatReply).len(), 1);
        assert_eq!(registry.get_by_type(JobType::ChallengeEvaluation).len(), 0);
    }
}
