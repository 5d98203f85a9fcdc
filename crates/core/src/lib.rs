// crates/core/src/lib.rs
//! Core types for the skilldeck learning dashboard.
//!
//! This crate holds everything shared between the server and the client
//! library: the domain model (learning topics, chat messages, evaluation
//! results), the background-job wire model, the stream-event envelope used
//! on the SSE chat/evaluation endpoints, and the `AiProvider` seam that
//! job executors call into.

pub mod ai;
pub mod events;
pub mod jobs;
pub mod types;

pub use ai::{AiError, AiProvider};
pub use events::{StreamEvent, StreamMeta, ToolInvocation};
pub use jobs::{Job, JobOperation, JobStatus, JobType};
