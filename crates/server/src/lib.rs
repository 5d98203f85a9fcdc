// crates/server/src/lib.rs
//! HTTP server for the skilldeck learning dashboard.
//!
//! Exposes background job submission and polling, challenge evaluation
//! snapshots, and SSE streaming for chat and evaluations. All state is
//! in-memory; an `AiProvider` implementation supplies the model.

pub mod error;
pub mod evaluations;
pub mod jobs;
pub mod routes;
pub mod state;
pub mod threads;

use std::time::Duration;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::routes::api_routes;
use crate::state::AppState;

/// Create the application router.
///
/// This sets up:
/// - API routes (health, jobs, evaluations, chat)
/// - CORS for development (allows any origin)
/// - Request tracing
pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Spawn the periodic registry cleanup loop.
pub fn spawn_cleanup_task(state: AppState, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            state.registry.cleanup();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use skilldeck_core::ai::ScriptedProvider;
    use tower::ServiceExt;

    fn test_app() -> Router {
        create_app(AppState::new(Arc::new(ScriptedProvider::new())))
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body_str = String::from_utf8(body.to_vec()).unwrap();

        (status, body_str)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (status, body) = get(test_app(), "/api/health").await;
        assert_eq!(status, StatusCode::OK);

        let health: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["provider"], "scripted");
        assert!(health["uptimeSecs"].is_u64());
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let (status, _) = get(test_app(), "/api/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_job_is_404_json() {
        let (status, body) = get(test_app(), "/api/jobs/missing-id").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let error: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(error["error"], "Job not found");
    }

    #[tokio::test]
    async fn test_bad_job_type_filter_is_400() {
        let (status, _) = get(test_app(), "/api/jobs?type=bogus").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
