// crates/client/src/lib.rs
//! Client-side companion to the skilldeck server.
//!
//! Three layers:
//! - [`api`]: plain HTTP client for job submission and polling
//! - [`store`]: SSE stream consumption with per-stream dedup, coalesced
//!   subscriber notification, and stop-safe accumulation
//! - [`sync`]: optimistic pending markers reconciled against job status
//!   and the persisted resource

pub mod api;
pub mod error;
pub mod sse;
pub mod store;
pub mod sync;
pub mod transport;

pub use api::ApiClient;
pub use error::ClientError;
pub use store::{StreamPhase, StreamSnapshot, StreamStore, StreamStoreConfig, SubscriptionGuard};
pub use sync::{spawn_poller, PendingMarker, SyncState};
pub use transport::{ChannelTransport, HttpTransport, StreamRequest, StreamTransport};
