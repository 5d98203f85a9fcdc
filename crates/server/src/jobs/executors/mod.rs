// crates/server/src/jobs/executors/mod.rs
//! One executor module per job type. Each exposes a single `run` that
//! returns the job result as JSON or an `ExecutorError`.

pub mod chat;
pub mod evaluation;
pub mod topic;
