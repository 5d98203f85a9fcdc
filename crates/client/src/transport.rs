// crates/client/src/transport.rs
//! Transport seam between the stream store and the server.
//!
//! `HttpTransport` opens a real SSE request with reqwest and decodes the
//! byte stream into frames. `ChannelTransport` replays scripted frames
//! for tests, without a network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;

use crate::error::ClientError;
use crate::sse::{Frame, FrameParser};

/// What to ask the server to stream.
#[derive(Debug, Clone)]
pub enum StreamRequest {
    /// Assistant reply for a conversation; the stream id is the
    /// conversation id.
    Chat { message: String },
    /// Challenge evaluation; the stream id is the challenge id.
    Evaluation { submission: String },
}

impl StreamRequest {
    pub fn path(&self, stream_id: &str) -> String {
        match self {
            StreamRequest::Chat { .. } => format!("/api/chat/{stream_id}/stream"),
            StreamRequest::Evaluation { .. } => format!("/api/evaluations/{stream_id}/stream"),
        }
    }

    pub fn body(&self) -> serde_json::Value {
        match self {
            StreamRequest::Chat { message } => json!({ "message": message }),
            StreamRequest::Evaluation { submission } => json!({ "submission": submission }),
        }
    }
}

pub type FrameReceiver = mpsc::Receiver<Frame>;

#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Open a stream and return a receiver of decoded frames. The
    /// receiver closes when the server ends the stream.
    async fn open(&self, stream_id: &str, request: StreamRequest)
        -> Result<FrameReceiver, ClientError>;
}

/// SSE transport over HTTP.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl StreamTransport for HttpTransport {
    async fn open(
        &self,
        stream_id: &str,
        request: StreamRequest,
    ) -> Result<FrameReceiver, ClientError> {
        let url = format!("{}{}", self.base_url, request.path(stream_id));
        let response = self.client.post(&url).json(&request.body()).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut parser = FrameParser::new();
            let mut bytes = response.bytes_stream();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        tracing::debug!(error = %e, "SSE byte stream failed");
                        break;
                    }
                };
                for frame in parser.push(&chunk) {
                    let done = frame == Frame::Done;
                    if tx.send(frame).await.is_err() || done {
                        return;
                    }
                }
            }

            if let Some(frame) = parser.finish() {
                let _ = tx.send(frame).await;
            }
        });

        Ok(rx)
    }
}

/// Scripted transport for tests. Each `open` consumes the next queued
/// stream; `opens()` counts how many were consumed, which is how dedup
/// is asserted.
#[derive(Default)]
pub struct ChannelTransport {
    scripts: Mutex<VecDeque<FrameReceiver>>,
    opens: AtomicUsize,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a stream whose frames are all buffered up front.
    pub fn push_frames(self, frames: Vec<Frame>) -> Self {
        let (tx, rx) = mpsc::channel(frames.len().max(1));
        for frame in frames {
            let _ = tx.try_send(frame);
        }
        // Dropping tx closes the receiver after the buffered frames
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.push_back(rx);
        }
        self
    }

    /// Queue a stream fed manually by the returned sender.
    pub fn push_manual(&self) -> mpsc::Sender<Frame> {
        let (tx, rx) = mpsc::channel(64);
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.push_back(rx);
        }
        tx
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamTransport for ChannelTransport {
    async fn open(
        &self,
        _stream_id: &str,
        _request: StreamRequest,
    ) -> Result<FrameReceiver, ClientError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let script = match self.scripts.lock() {
            Ok(mut scripts) => scripts.pop_front(),
            Err(_) => None,
        };
        script.ok_or(ClientError::TransportClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_paths() {
        let chat = StreamRequest::Chat {
            message: "hi".to_string(),
        };
        assert_eq!(chat.path("c1"), "/api/chat/c1/stream");
        assert_eq!(chat.body()["message"], "hi");

        let eval = StreamRequest::Evaluation {
            submission: "code".to_string(),
        };
        assert_eq!(eval.path("ch-1"), "/api/evaluations/ch-1/stream");
        assert_eq!(eval.body()["submission"], "code");
    }

    #[tokio::test]
    async fn test_channel_transport_replays_in_order() {
        let transport = ChannelTransport::new()
            .push_frames(vec![Frame::Data("a".to_string()), Frame::Done]);

        let mut rx = transport
            .open("c1", StreamRequest::Chat { message: "hi".to_string() })
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(Frame::Data("a".to_string())));
        assert_eq!(rx.recv().await, Some(Frame::Done));
        assert_eq!(rx.recv().await, None);
        assert_eq!(transport.opens(), 1);

        // Script exhausted
        let err = transport
            .open("c1", StreamRequest::Chat { message: "hi".to_string() })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::TransportClosed));
    }
}
