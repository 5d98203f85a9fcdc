//! End-to-end tests: a real server on an ephemeral port, consumed
//! through the HTTP transport, stream store, API client, and sync layer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use skilldeck_client::sync::ResourceProbe;
use skilldeck_client::{
    ApiClient, ClientError, PendingMarker, StreamPhase, StreamRequest, StreamStore, SyncState,
};
use skilldeck_client::transport::HttpTransport;
use skilldeck_core::ai::ScriptedProvider;
use skilldeck_core::jobs::{ChatReplyInput, JobOperation, JobStatus, JobType};
use skilldeck_server::create_app;
use skilldeck_server::state::AppState;

async fn spawn_server(provider: ScriptedProvider) -> String {
    let app = create_app(AppState::new(Arc::new(provider)));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_chat_stream_end_to_end() {
    let reply = "Ownership moves values; borrowing lends them.";
    let base = spawn_server(ScriptedProvider::new().push_response(reply)).await;

    let store = StreamStore::new(Arc::new(HttpTransport::new(&base)));
    let snapshot = store
        .start_stream(
            "c1",
            StreamRequest::Chat {
                message: "Explain ownership".to_string(),
            },
        )
        .await
        .unwrap();

    assert_eq!(snapshot.phase, StreamPhase::Done);
    assert_eq!(snapshot.content, reply);
    assert!(snapshot.meta.is_some());

    // The reply was persisted server-side
    let api = ApiClient::new(&base);
    let convo = api.conversation("c1").await.unwrap();
    assert_eq!(convo.message_count, 2);
    assert_eq!(convo.messages[1].content, reply);
}

#[tokio::test]
async fn test_evaluation_stream_end_to_end() {
    let script = "Clear logic throughout.\n\
                  {\"score\": 91, \"passed\": true, \"feedback\": \"Excellent\"}\n";
    let base = spawn_server(ScriptedProvider::new().push_response(script)).await;

    let store = StreamStore::new(Arc::new(HttpTransport::new(&base)));
    let snapshot = store
        .start_stream(
            "ch-1",
            StreamRequest::Evaluation {
                submission: "fn main() {}".to_string(),
            },
        )
        .await
        .unwrap();

    assert_eq!(snapshot.phase, StreamPhase::Done);
    assert!(snapshot.feedback.contains("Clear logic throughout."));
    assert_eq!(snapshot.result.as_ref().unwrap()["passed"], true);

    // Snapshot endpoint agrees with the stream
    let api = ApiClient::new(&base);
    assert!(api.evaluation("ch-other").await.unwrap().is_none());
    let stored = api.evaluation("ch-1").await.unwrap().unwrap();
    assert_eq!(stored["status"], "complete");
    assert_eq!(stored["result"]["score"].as_f64(), Some(91.0));
}

/// Probe that considers a chat-reply marker satisfied once the
/// conversation holds more messages than it did at submission time.
struct MessageCountProbe {
    api: ApiClient,
}

#[async_trait]
impl ResourceProbe for MessageCountProbe {
    async fn satisfied(&self, marker: &PendingMarker) -> Result<bool, ClientError> {
        let baseline = marker.details["messageCountBefore"].as_u64().unwrap_or(0) as usize;
        let convo = self.api.conversation(&marker.target_id).await?;
        Ok(convo.message_count > baseline.saturating_add(1))
    }
}

#[tokio::test]
async fn test_job_submission_and_reconciliation() {
    let base = spawn_server(ScriptedProvider::new().push_response("Sure, here's a hint.")).await;
    let api = ApiClient::new(&base);

    let baseline = api.conversation("c1").await.unwrap().message_count;
    let created = api
        .submit_job(
            JobOperation::ChatReply(ChatReplyInput {
                conversation_id: "c1".to_string(),
                message: "Give me a hint".to_string(),
            }),
            Some("c1".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(created.status, JobStatus::Pending);

    let sync = SyncState::new();
    sync.mark_pending(
        PendingMarker::new(&created.id, JobType::ChatReply, "c1")
            .with_details(json!({ "messageCountBefore": baseline })),
    );
    assert!(sync.is_pending("c1"));

    let probe = MessageCountProbe {
        api: ApiClient::new(&base),
    };
    for _ in 0..400 {
        sync.reconcile(&api, &probe).await;
        if !sync.is_pending("c1") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(!sync.is_pending("c1"), "marker never cleared");

    // The job record is terminal and the reply is persisted
    let job = api.get_job(&created.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(api.conversation("c1").await.unwrap().message_count, 2);

    // Filtered listing sees it too
    let done = api
        .list_jobs(Some(JobType::ChatReply), Some(JobStatus::Completed))
        .await
        .unwrap();
    assert_eq!(done.len(), 1);
}
