//! End-to-end lifecycle: submission through worker loop to terminal
//! state, on the real file backend.

use std::sync::Arc;
use std::time::Duration;

use renderq_core::application::{QueueManager, StaleClaimMonitor, WorkerConfig, WorkerRunner};
use renderq_core::domain::{InputRef, JobStatus};
use renderq_core::port::id_provider::UuidProvider;
use renderq_core::port::pipeline::mocks::MockPipeline;
use renderq_core::port::time_provider::mocks::FixedTimeProvider;
use renderq_core::port::time_provider::SystemTimeProvider;
use renderq_core::port::{DirectQueue, JobStore};
use renderq_infra_file::FileJobStore;
use serde_json::json;

fn manager(store: Arc<dyn JobStore>) -> QueueManager {
    QueueManager::new(store, Arc::new(UuidProvider), Arc::new(SystemTimeProvider))
}

/// Run exactly one poll cycle as the named worker and assert it
/// processed a job (a retrying failure would otherwise be re-claimed by
/// the same looping worker before anyone could observe the requeue)
async fn process_one(store: Arc<dyn JobStore>, pipeline: Arc<MockPipeline>, worker_id: &str) {
    let mut config = WorkerConfig::new(worker_id, "gpu");
    config.poll_interval = Duration::from_millis(10);
    config.call_retry_delay = Duration::from_millis(1);

    let queue = Arc::new(DirectQueue::new(store));
    let runner = WorkerRunner::new(config, queue, pipeline);
    assert!(runner.run_once().await.unwrap(), "expected a job to claim");
}

#[tokio::test]
async fn failed_attempt_requeues_then_second_worker_completes() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn JobStore> = Arc::new(FileJobStore::open(dir.path()).await.unwrap());
    let manager = manager(Arc::clone(&store));

    let submitted = manager
        .submit(
            InputRef::new(json!({"audio_path": "tracks/demo.mp3"})),
            1,
            Some(2),
        )
        .await
        .unwrap();
    assert_eq!(submitted.status, JobStatus::Queued);

    // First worker's pipeline blows up
    process_one(
        Arc::clone(&store),
        Arc::new(MockPipeline::new_fail("oom")),
        "worker-a",
    )
    .await;

    let after_failure = store.get(&submitted.id).await.unwrap().unwrap();
    assert_eq!(after_failure.status, JobStatus::Queued);
    assert_eq!(after_failure.attempt, 1);
    assert!(after_failure.message.starts_with("retry 1/2:"));
    assert!(after_failure.message.contains("oom"));
    assert!(after_failure.claimed_by.is_none());

    // Second worker picks the requeued job up and finishes it
    let pipeline =
        Arc::new(MockPipeline::new_success().with_output(json!("out/123"), Some(9.4), Some(8.8)));
    process_one(Arc::clone(&store), pipeline, "worker-b").await;

    let done = store.get(&submitted.id).await.unwrap().unwrap();
    assert_eq!(done.status, JobStatus::Complete);
    assert_eq!(done.progress, 100);
    assert_eq!(done.output.unwrap().as_value(), &json!("out/123"));
    assert_eq!(done.quality_score, Some(9.4));
    assert_eq!(done.loop_score, Some(8.8));
    assert_eq!(done.attempt, 1, "completion does not touch the counter");
}

#[tokio::test]
async fn exhausted_attempts_dead_letter_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn JobStore> = Arc::new(FileJobStore::open(dir.path()).await.unwrap());
    let manager = manager(Arc::clone(&store));

    let submitted = manager
        .submit(
            InputRef::new(json!({"audio_path": "tracks/demo.mp3"})),
            1,
            Some(1),
        )
        .await
        .unwrap();

    process_one(
        Arc::clone(&store),
        Arc::new(MockPipeline::new_fail("no gpu")),
        "worker-a",
    )
    .await;

    let dead = store.get(&submitted.id).await.unwrap().unwrap();
    assert_eq!(dead.status, JobStatus::Dead);
    assert_eq!(dead.attempt, 1);
    assert!(dead.message.starts_with("failed after 1 attempts:"));
    // Forensics survive dead-lettering
    assert_eq!(dead.claimed_by.as_deref(), Some("worker-a"));
    assert!(dead.last_error.as_deref().unwrap().contains("no gpu"));
}

#[tokio::test]
async fn stale_claim_is_reclaimed_without_consuming_an_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let time = Arc::new(FixedTimeProvider::new(1_000_000));
    let store: Arc<dyn JobStore> = Arc::new(
        FileJobStore::open_with_time(dir.path(), time.clone())
            .await
            .unwrap(),
    );

    let manager = QueueManager::new(Arc::clone(&store), Arc::new(UuidProvider), time.clone());
    let submitted = manager
        .submit(InputRef::new(json!({"audio_path": "t.mp3"})), 1, None)
        .await
        .unwrap();

    // A worker claims and then disappears
    store.claim("vanished-worker", "colab").await.unwrap().unwrap();

    let stale_after = Duration::from_secs(30 * 60);
    let monitor = StaleClaimMonitor::new(Arc::clone(&store), time.clone())
        .with_timing(Duration::from_secs(30), stale_after);

    // Not yet stale
    time.advance(stale_after.as_millis() as i64 - 1);
    assert_eq!(monitor.run_once().await.unwrap(), 0);

    // Now past the threshold
    time.advance(2);
    assert_eq!(monitor.run_once().await.unwrap(), 1);

    let reclaimed = store.get(&submitted.id).await.unwrap().unwrap();
    assert_eq!(reclaimed.status, JobStatus::Queued);
    assert_eq!(reclaimed.attempt, 0);
    assert!(reclaimed.claimed_by.is_none());

    // And it is claimable again
    let again = store.claim("fresh-worker", "colab").await.unwrap().unwrap();
    assert_eq!(again.id, submitted.id);
}

#[tokio::test]
async fn queue_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();

    let submitted = {
        let store: Arc<dyn JobStore> = Arc::new(FileJobStore::open(dir.path()).await.unwrap());
        let manager = manager(Arc::clone(&store));
        let job = manager
            .submit(InputRef::new(json!({"audio_path": "t.mp3"})), 3, None)
            .await
            .unwrap();
        store.claim("worker-a", "gpu").await.unwrap().unwrap();
        job
    };

    // Fresh process over the same directory
    let store = FileJobStore::open(dir.path()).await.unwrap();
    let restored = store.get(&submitted.id).await.unwrap().unwrap();
    assert_eq!(restored.status, JobStatus::Claimed);
    assert_eq!(restored.claimed_by.as_deref(), Some("worker-a"));
    assert_eq!(restored.priority, 3);
    assert_eq!(restored.input.as_value(), &json!({"audio_path": "t.mp3"}));

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.claimed, 1);
}
