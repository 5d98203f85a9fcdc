// crates/server/src/main.rs
//! Skilldeck server binary.
//!
//! Binds the listener immediately, then spawns the periodic job registry
//! cleanup loop. The AI provider is the local `claude` CLI.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use skilldeck_core::ai::{AiProvider, ClaudeCliProvider};
use skilldeck_server::state::AppState;
use skilldeck_server::{create_app, spawn_cleanup_task};

/// Default port for the server.
const DEFAULT_PORT: u16 = 47310;

/// Registry garbage collection cadence.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Default model passed to the `claude` CLI.
const DEFAULT_MODEL: &str = "sonnet";

/// Get the server port from environment or use default.
fn get_port() -> u16 {
    std::env::var("SKILLDECK_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let model = std::env::var("SKILLDECK_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
    let provider = Arc::new(ClaudeCliProvider::new(model));
    if let Err(e) = provider.health_check().await {
        tracing::warn!(error = %e, "AI provider unavailable at startup; jobs will fail until it recovers");
    }

    let state = AppState::new(provider);
    let app = create_app(state.clone());

    spawn_cleanup_task(state, CLEANUP_INTERVAL);

    let addr = SocketAddr::from(([127, 0, 0, 1], get_port()));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("skilldeck v{} listening on http://{addr}", env!("CARGO_PKG_VERSION"));

    axum::serve(listener, app).await?;
    Ok(())
}
