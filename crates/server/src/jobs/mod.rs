// crates/server/src/jobs/mod.rs
//! Background job subsystem: the registry tracks lifecycle, the executor
//! layer runs the work.

pub mod executor;
pub mod executors;
pub mod registry;

pub use executor::{spawn_job, ExecutorError};
pub use registry::{JobRegistry, JobRegistryConfig};
