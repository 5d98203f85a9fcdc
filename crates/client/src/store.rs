// crates/client/src/store.rs
//! Client-side stream store.
//!
//! One entry per stream id (conversation or challenge). `start_stream`
//! opens the transport once per live id: a second call while the stream
//! is active returns the current snapshot without network I/O, and the
//! opening call resolves with the terminal snapshot. Events are applied
//! to the snapshot as they arrive, but subscriber notifications are
//! coalesced onto a flush interval so a burst of deltas wakes listeners
//! once; terminal transitions force-flush so the last notification
//! always carries complete content. Stopping a stream keeps everything
//! received so far. Finished entries are pruned after a retention
//! window unless the id was restarted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use skilldeck_core::events::{StreamEvent, StreamMeta, ToolInvocation};

use crate::error::ClientError;
use crate::sse::Frame;
use crate::transport::{FrameReceiver, StreamRequest, StreamTransport};

#[derive(Debug, Clone)]
pub struct StreamStoreConfig {
    /// Minimum spacing between subscriber notifications while a stream
    /// is producing events.
    pub flush_interval: Duration,
    /// How long finished streams stay readable before pruning.
    pub retention: Duration,
}

impl Default for StreamStoreConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_millis(50),
            retention: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    /// Transport is connecting; no frame received yet.
    Pending,
    Streaming,
    Done,
    Error,
    Aborted,
}

impl StreamPhase {
    pub fn is_terminal(self) -> bool {
        !matches!(self, StreamPhase::Pending | StreamPhase::Streaming)
    }
}

/// Accumulated view of one stream.
#[derive(Debug, Clone)]
pub struct StreamSnapshot {
    pub phase: StreamPhase,
    pub content: String,
    pub feedback: String,
    pub partial: Option<Value>,
    pub result: Option<Value>,
    pub meta: Option<StreamMeta>,
    pub tool_calls: Vec<ToolInvocation>,
    pub error: Option<String>,
}

impl StreamSnapshot {
    fn pending() -> Self {
        Self {
            phase: StreamPhase::Pending,
            content: String::new(),
            feedback: String::new(),
            partial: None,
            result: None,
            meta: None,
            tool_calls: Vec::new(),
            error: None,
        }
    }
}

type SnapshotCallback = Arc<dyn Fn(&StreamSnapshot) + Send + Sync>;
type ActivityCallback = Arc<dyn Fn(&[String]) + Send + Sync>;

enum Subscriber {
    Stream {
        stream_id: String,
        callback: SnapshotCallback,
    },
    Activity {
        callback: ActivityCallback,
    },
}

/// Removes its subscription when dropped.
pub struct SubscriptionGuard {
    inner: Weak<Inner>,
    id: u64,
}

impl SubscriptionGuard {
    pub fn unsubscribe(self) {}
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            lock(&inner.subscribers).remove(&self.id);
        }
    }
}

struct StreamEntry {
    snapshot: StreamSnapshot,
    abort: CancellationToken,
    finished: watch::Sender<bool>,
    finished_at: Option<Instant>,
}

struct Inner {
    transport: Arc<dyn StreamTransport>,
    config: StreamStoreConfig,
    streams: Mutex<HashMap<String, StreamEntry>>,
    subscribers: Mutex<HashMap<u64, Subscriber>>,
    next_subscriber: AtomicU64,
}

/// Shared stream store. Cheap to clone.
#[derive(Clone)]
pub struct StreamStore {
    inner: Arc<Inner>,
}

impl StreamStore {
    pub fn new(transport: Arc<dyn StreamTransport>) -> Self {
        Self::with_config(transport, StreamStoreConfig::default())
    }

    pub fn with_config(transport: Arc<dyn StreamTransport>, config: StreamStoreConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                config,
                streams: Mutex::new(HashMap::new()),
                subscribers: Mutex::new(HashMap::new()),
                next_subscriber: AtomicU64::new(1),
            }),
        }
    }

    /// Open a stream for `stream_id` and resolve once it is terminal.
    ///
    /// If the id is already live this is a join, not an open: the
    /// current snapshot comes back immediately and no second transport
    /// stream is created.
    pub async fn start_stream(
        &self,
        stream_id: &str,
        request: StreamRequest,
    ) -> Result<StreamSnapshot, ClientError> {
        self.prune();

        let abort = CancellationToken::new();
        let (finished_tx, mut finished_rx) = watch::channel(false);
        {
            let mut streams = lock(&self.inner.streams);
            if let Some(entry) = streams.get(stream_id) {
                if !entry.snapshot.phase.is_terminal() {
                    return Ok(entry.snapshot.clone());
                }
            }
            streams.insert(
                stream_id.to_string(),
                StreamEntry {
                    snapshot: StreamSnapshot::pending(),
                    abort: abort.clone(),
                    finished: finished_tx,
                    finished_at: None,
                },
            );
        }
        self.inner.notify_activity();

        let rx = match self.inner.transport.open(stream_id, request).await {
            Ok(rx) => rx,
            Err(e) => {
                self.inner
                    .finish(stream_id, StreamPhase::Error, Some(e.to_string()));
                return Err(e);
            }
        };

        let inner = Arc::clone(&self.inner);
        tokio::spawn(run_stream(inner, stream_id.to_string(), rx, abort));

        // A dropped sender means the entry was replaced by a restart;
        // fall through to whatever snapshot exists now.
        let _ = finished_rx.wait_for(|done| *done).await;
        self.snapshot(stream_id).ok_or(ClientError::TransportClosed)
    }

    /// Stop consuming a stream. The snapshot keeps everything received
    /// so far, with phase `Aborted`.
    pub fn stop_stream(&self, stream_id: &str) {
        let streams = lock(&self.inner.streams);
        if let Some(entry) = streams.get(stream_id) {
            entry.abort.cancel();
        }
    }

    pub fn snapshot(&self, stream_id: &str) -> Option<StreamSnapshot> {
        lock(&self.inner.streams)
            .get(stream_id)
            .map(|e| e.snapshot.clone())
    }

    /// Ids of streams currently receiving events.
    pub fn active_ids(&self) -> Vec<String> {
        self.inner.active_ids()
    }

    /// Subscribe to coalesced snapshot updates for one stream. If the
    /// stream already exists the callback fires immediately with the
    /// current snapshot.
    pub fn subscribe(
        &self,
        stream_id: &str,
        callback: impl Fn(&StreamSnapshot) + Send + Sync + 'static,
    ) -> SubscriptionGuard {
        let callback: SnapshotCallback = Arc::new(callback);
        if let Some(snapshot) = self.snapshot(stream_id) {
            callback(&snapshot);
        }
        self.register(Subscriber::Stream {
            stream_id: stream_id.to_string(),
            callback,
        })
    }

    /// Subscribe to changes of the active stream-id set. Fires
    /// immediately with the current set.
    pub fn subscribe_to_activity(
        &self,
        callback: impl Fn(&[String]) + Send + Sync + 'static,
    ) -> SubscriptionGuard {
        let callback: ActivityCallback = Arc::new(callback);
        callback(&self.inner.active_ids());
        self.register(Subscriber::Activity { callback })
    }

    /// Drop finished streams older than the retention window. Entries
    /// restarted since they finished carry fresh state and are kept.
    pub fn prune(&self) -> usize {
        let retention = self.inner.config.retention;
        let now = Instant::now();
        let mut streams = lock(&self.inner.streams);
        let before = streams.len();
        streams.retain(|_, entry| {
            entry
                .finished_at
                .map(|at| now.duration_since(at) < retention)
                .unwrap_or(true)
        });
        before - streams.len()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.streams).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn register(&self, subscriber: Subscriber) -> SubscriptionGuard {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::SeqCst);
        lock(&self.inner.subscribers).insert(id, subscriber);
        SubscriptionGuard {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Inner {
    fn active_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.streams)
            .iter()
            .filter(|(_, entry)| !entry.snapshot.phase.is_terminal())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Callbacks are collected under the lock and invoked after it is
    /// released.
    fn notify_stream(&self, id: &str) {
        let Some(snapshot) = lock(&self.streams).get(id).map(|e| e.snapshot.clone()) else {
            return;
        };
        let callbacks: Vec<SnapshotCallback> = lock(&self.subscribers)
            .values()
            .filter_map(|sub| match sub {
                Subscriber::Stream {
                    stream_id,
                    callback,
                } if stream_id == id => Some(Arc::clone(callback)),
                _ => None,
            })
            .collect();
        for callback in callbacks {
            callback(&snapshot);
        }
    }

    fn notify_activity(&self) {
        let active = self.active_ids();
        let callbacks: Vec<ActivityCallback> = lock(&self.subscribers)
            .values()
            .filter_map(|sub| match sub {
                Subscriber::Activity { callback } => Some(Arc::clone(callback)),
                _ => None,
            })
            .collect();
        for callback in callbacks {
            callback(&active);
        }
    }

    /// Apply one event to the snapshot. Returns true when the event is
    /// terminal for the stream.
    fn apply(
        &self,
        id: &str,
        event: StreamEvent,
        pending_tools: &mut HashMap<String, Value>,
    ) -> bool {
        let mut streams = lock(&self.streams);
        let Some(entry) = streams.get_mut(id) else {
            return true;
        };
        let snapshot = &mut entry.snapshot;
        if snapshot.phase == StreamPhase::Pending {
            snapshot.phase = StreamPhase::Streaming;
        }

        match event {
            StreamEvent::Delta { content } => snapshot.content.push_str(&content),
            StreamEvent::FeedbackDelta { content } => snapshot.feedback.push_str(&content),
            StreamEvent::Meta(meta) => snapshot.meta = Some(meta),
            StreamEvent::ToolStart { name, args } => {
                pending_tools.insert(name, args);
            }
            StreamEvent::ToolComplete {
                name,
                result,
                duration_ms,
            } => {
                let args = pending_tools.remove(&name).unwrap_or(Value::Null);
                snapshot.tool_calls.push(ToolInvocation {
                    name,
                    args,
                    result,
                    duration_ms: Some(duration_ms),
                });
            }
            StreamEvent::Partial { fields } => match (&mut snapshot.partial, fields) {
                (Some(Value::Object(existing)), Value::Object(new)) => {
                    for (k, v) in new {
                        existing.insert(k, v);
                    }
                }
                (slot, fields) => *slot = Some(fields),
            },
            StreamEvent::Result { fields } => {
                snapshot.result = Some(fields);
            }
            StreamEvent::Done {
                total_content,
                tool_calls,
            } => {
                // The final event is authoritative when it carries more
                // than was streamed
                if total_content.len() > snapshot.content.len() {
                    snapshot.content = total_content;
                }
                if !tool_calls.is_empty() {
                    snapshot.tool_calls = tool_calls;
                }
                snapshot.phase = StreamPhase::Done;
                entry.finished_at = Some(Instant::now());
                return true;
            }
            StreamEvent::Error { message } => {
                snapshot.error = Some(message);
                snapshot.phase = StreamPhase::Error;
                entry.finished_at = Some(Instant::now());
                return true;
            }
        }
        false
    }

    /// Mark a still-streaming entry terminal. No-op on the snapshot if
    /// the stream already finished through an event; always wakes the
    /// opener and flushes subscribers.
    fn finish(&self, id: &str, phase: StreamPhase, error: Option<String>) {
        {
            let mut streams = lock(&self.streams);
            if let Some(entry) = streams.get_mut(id) {
                if !entry.snapshot.phase.is_terminal() {
                    entry.snapshot.phase = phase;
                    entry.snapshot.error = error;
                    entry.finished_at = Some(Instant::now());
                }
            }
        }
        self.finalize(id);
    }

    /// Terminal force-flush: wake the `start_stream` waiter and notify
    /// stream and activity subscribers.
    fn finalize(&self, id: &str) {
        {
            let streams = lock(&self.streams);
            if let Some(entry) = streams.get(id) {
                entry.finished.send_replace(true);
            }
        }
        self.notify_stream(id);
        self.notify_activity();
    }
}

async fn run_stream(
    inner: Arc<Inner>,
    id: String,
    mut rx: FrameReceiver,
    abort: CancellationToken,
) {
    let flush_interval = inner.config.flush_interval;
    let mut pending_tools: HashMap<String, Value> = HashMap::new();
    let mut flush_at: Option<Instant> = None;

    loop {
        let deadline = flush_at.unwrap_or_else(Instant::now);
        tokio::select! {
            biased;
            _ = abort.cancelled() => {
                inner.finish(&id, StreamPhase::Aborted, None);
                return;
            }
            _ = tokio::time::sleep_until(deadline), if flush_at.is_some() => {
                flush_at = None;
                inner.notify_stream(&id);
            }
            frame = rx.recv() => match frame {
                Some(Frame::Done) => {
                    inner.finish(&id, StreamPhase::Done, None);
                    return;
                }
                Some(Frame::Data(payload)) => {
                    let event = match serde_json::from_str::<StreamEvent>(&payload) {
                        Ok(event) => event,
                        Err(e) => {
                            tracing::debug!(stream_id = %id, error = %e, "Skipping undecodable frame");
                            continue;
                        }
                    };
                    if inner.apply(&id, event, &mut pending_tools) {
                        inner.finalize(&id);
                        return;
                    }
                    if flush_at.is_none() {
                        flush_at = Some(Instant::now() + flush_interval);
                    }
                }
                None => {
                    inner.finish(
                        &id,
                        StreamPhase::Error,
                        Some("transport closed before the stream completed".to_string()),
                    );
                    return;
                }
            }
        }
    }
}
