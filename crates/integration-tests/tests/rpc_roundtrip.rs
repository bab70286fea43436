//! Full RPC round-trip: daemon-shaped wiring (file store + queue
//! manager + JSON-RPC server on an ephemeral port) driven through the
//! SDK client, the way a remote worker drives it.

use std::sync::Arc;

use renderq_api_rpc::{RpcServer, RpcServerConfig};
use renderq_core::application::QueueManager;
use renderq_core::domain::JobStatus;
use renderq_core::port::id_provider::UuidProvider;
use renderq_core::port::time_provider::SystemTimeProvider;
use renderq_infra_file::FileJobStore;
use renderq_sdk::QueueClient;
use serde_json::json;

async fn start_daemon(dir: &std::path::Path) -> (QueueClient, jsonrpsee::server::ServerHandle) {
    let store = Arc::new(FileJobStore::open(dir).await.unwrap());
    let manager = Arc::new(QueueManager::new(
        store,
        Arc::new(UuidProvider),
        Arc::new(SystemTimeProvider),
    ));

    let config = RpcServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
    };
    let (addr, handle) = RpcServer::new(config, manager).start().await.unwrap();

    let client = QueueClient::connect(format!("http://{addr}")).unwrap();
    (client, handle)
}

#[tokio::test]
async fn remote_worker_lifecycle_over_rpc() {
    let dir = tempfile::tempdir().unwrap();
    let (client, handle) = start_daemon(dir.path()).await;

    // Submit
    let job = client
        .submit(
            json!({"audio_path": "tracks/demo.mp3", "style": "midnight_city"}),
            1,
            None,
        )
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Queued);

    // Claim (input comes back verbatim)
    let claimed = client.claim("remote-worker", "colab").await.unwrap().unwrap();
    assert_eq!(claimed.id, job.id);
    assert_eq!(
        claimed.input.as_value(),
        &json!({"audio_path": "tracks/demo.mp3", "style": "midnight_city"})
    );
    assert_eq!(claimed.claimed_by.as_deref(), Some("remote-worker"));

    // Empty queue: claim is None, not an error
    assert!(client.claim("second-worker", "colab").await.unwrap().is_none());

    // Progress with a status step
    client
        .progress(&job.id, 50, "generating visuals", Some(JobStatus::Generating))
        .await
        .unwrap();
    let mid = client.status(&job.id).await.unwrap().unwrap();
    assert_eq!(mid.status, JobStatus::Generating);
    assert_eq!(mid.progress, 50);
    assert_eq!(mid.message, "generating visuals");

    // Complete with pass-through scores
    client
        .complete(
            &job.id,
            "remote-worker",
            json!({"output_dir": "out/123"}),
            Some(9.4),
            Some(8.8),
        )
        .await
        .unwrap();

    let done = client.status(&job.id).await.unwrap().unwrap();
    assert_eq!(done.status, JobStatus::Complete);
    assert_eq!(done.progress, 100);
    assert_eq!(done.quality_score, Some(9.4));

    let stats = client.stats().await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.complete, 1);

    handle.stop().unwrap();
}

#[tokio::test]
async fn retry_and_dead_letter_over_rpc() {
    let dir = tempfile::tempdir().unwrap();
    let (client, handle) = start_daemon(dir.path()).await;

    let job = client
        .submit(json!({"audio_path": "t.mp3"}), 1, Some(2))
        .await
        .unwrap();

    client.claim("w", "gpu").await.unwrap().unwrap();
    let first = client.fail(&job.id, "w", "oom").await.unwrap();
    assert!(first.ok);
    assert_eq!(first.status, "queued");
    assert_eq!(first.attempt, 1);

    client.claim("w", "gpu").await.unwrap().unwrap();
    let second = client.fail(&job.id, "w", "oom again").await.unwrap();
    assert!(second.ok);
    assert_eq!(second.status, "dead");
    assert_eq!(second.attempt, 2);

    // Reporting against the dead job is acknowledged but ignored
    let late = client.fail(&job.id, "w", "late").await.unwrap();
    assert!(!late.ok);
    assert_eq!(late.status, "dead");

    let dead = client.status(&job.id).await.unwrap().unwrap();
    assert_eq!(dead.status, JobStatus::Dead);
    assert!(dead.message.starts_with("failed after 2 attempts:"));

    handle.stop().unwrap();
}

#[tokio::test]
async fn unknown_job_surfaces_the_not_found_code() {
    let dir = tempfile::tempdir().unwrap();
    let (client, handle) = start_daemon(dir.path()).await;

    let err = client
        .complete("no-such-job", "w", json!(null), None, None)
        .await
        .unwrap_err();
    match err {
        renderq_sdk::SdkError::Rpc { code, .. } => assert_eq!(code, 4001),
        other => panic!("expected RPC error, got {other:?}"),
    }

    assert!(client.status("no-such-job").await.unwrap().is_none());

    handle.stop().unwrap();
}
