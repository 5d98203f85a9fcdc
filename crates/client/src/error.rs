// crates/client/src/error.rs

use thiserror::Error;

/// Errors surfaced by the client layers.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },

    #[error("malformed payload: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("transport closed before the stream completed")]
    TransportClosed,
}
