// crates/server/src/routes/mod.rs
//! API route handlers for the skilldeck server.

pub mod chat;
pub mod evaluations;
pub mod health;
pub mod jobs;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router with all routes under /api prefix.
///
/// Routes:
/// - GET /api/health - Health check
/// - POST /api/jobs - Submit a background job
/// - GET /api/jobs - List jobs, filterable by type and status
/// - GET /api/jobs/{id} - Get one job
/// - DELETE /api/jobs/{id} - Cancel and remove a job
/// - GET /api/evaluations/{challenge_id} - Evaluation progress snapshot
/// - DELETE /api/evaluations/{challenge_id} - Discard an evaluation snapshot
/// - POST /api/evaluations/{challenge_id}/stream - SSE evaluation run
/// - GET /api/chat/{conversation_id} - Conversation history
/// - POST /api/chat/{conversation_id}/stream - SSE chat reply
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", jobs::router())
        .nest("/api", evaluations::router())
        .nest("/api", chat::router())
        .with_state(state)
}
