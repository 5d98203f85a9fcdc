// crates/server/src/state.rs
//! Shared application state for route handlers and executors.

use std::sync::Arc;
use std::time::Instant;

use skilldeck_core::ai::AiProvider;

use crate::evaluations::EvaluationStore;
use crate::jobs::JobRegistry;
use crate::threads::ThreadStore;

#[derive(Clone)]
pub struct AppState {
    pub start_time: Instant,
    pub registry: Arc<JobRegistry>,
    pub evaluations: Arc<EvaluationStore>,
    pub threads: Arc<dyn ThreadStore>,
    pub ai: Arc<dyn AiProvider>,
}

impl AppState {
    pub fn new(ai: Arc<dyn AiProvider>) -> Self {
        Self {
            start_time: Instant::now(),
            registry: Arc::new(JobRegistry::new()),
            evaluations: Arc::new(EvaluationStore::new()),
            threads: Arc::new(crate::threads::InMemoryThreadStore::new()),
            ai,
        }
    }
}
