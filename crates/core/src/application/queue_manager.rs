// Submission API (QueueManager)
// The facade the API-server side uses: create jobs, read status and
// statistics, own the stale-claim monitor lifecycle.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::application::monitor::StaleClaimMonitor;
use crate::application::worker::{shutdown_channel, ShutdownSender};
use crate::domain::{InputRef, JobRecord, QueueStats};
use crate::error::Result;
use crate::port::{IdProvider, JobStore, TimeProvider};

struct MonitorHandle {
    sender: ShutdownSender,
    task: JoinHandle<()>,
}

/// Caller-side queue facade.
///
/// Owns exactly one JobStore for the process lifetime; build it at
/// startup and inject it wherever the submission surface is needed.
/// Submission always requests full-fidelity generation; degrading to a
/// fast preview is never the worker's call and not offered here.
pub struct QueueManager {
    store: Arc<dyn JobStore>,
    id_provider: Arc<dyn IdProvider>,
    time: Arc<dyn TimeProvider>,
    monitor: Mutex<Option<MonitorHandle>>,
}

impl QueueManager {
    pub fn new(
        store: Arc<dyn JobStore>,
        id_provider: Arc<dyn IdProvider>,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            store,
            id_provider,
            time,
            monitor: Mutex::new(None),
        }
    }

    pub fn store(&self) -> Arc<dyn JobStore> {
        Arc::clone(&self.store)
    }

    /// Create and enqueue a new job. Returns the stored record.
    pub async fn submit(
        &self,
        input: InputRef,
        priority: i32,
        max_attempts: Option<i32>,
    ) -> Result<JobRecord> {
        let id = self.id_provider.generate_id();
        let mut record = JobRecord::new(id, self.time.now_millis(), input, priority);
        if let Some(max_attempts) = max_attempts {
            record = record.with_max_attempts(max_attempts);
        }
        self.store.enqueue(&record).await?;
        info!(job_id = %record.id, priority = record.priority, "Job submitted");
        Ok(record)
    }

    pub async fn get_status(&self, id: &str) -> Result<Option<JobRecord>> {
        self.store.get(id).await
    }

    pub async fn get_stats(&self) -> Result<QueueStats> {
        self.store.stats().await
    }

    /// Spawn the stale-claim monitor. One monitor per process; a second
    /// call while it is running is a no-op.
    pub fn start_monitor(&self, cycle_interval: Duration, stale_after: Duration) {
        let mut slot = self.monitor.lock().unwrap();
        if let Some(handle) = slot.as_ref() {
            if !handle.task.is_finished() {
                warn!("Monitor already running, ignoring start request");
                return;
            }
        }

        let monitor = StaleClaimMonitor::new(Arc::clone(&self.store), Arc::clone(&self.time))
            .with_timing(cycle_interval, stale_after);
        let (sender, token) = shutdown_channel();
        let task = tokio::spawn(async move { monitor.run(token).await });
        *slot = Some(MonitorHandle { sender, task });
    }

    /// Signal the monitor to stop and wait for it to finish.
    pub async fn stop_monitor(&self) {
        let handle = self.monitor.lock().unwrap().take();
        if let Some(MonitorHandle { sender, task }) = handle {
            sender.shutdown();
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobStatus;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::job_store::mocks::MemoryJobStore;
    use crate::port::time_provider::mocks::FixedTimeProvider;
    use serde_json::json;

    fn manager() -> (QueueManager, Arc<MemoryJobStore>, Arc<FixedTimeProvider>) {
        let time = Arc::new(FixedTimeProvider::new(1_000_000));
        let store = Arc::new(MemoryJobStore::with_time(time.clone()));
        let manager = QueueManager::new(
            store.clone(),
            Arc::new(SequentialIdProvider::new("job")),
            time.clone(),
        );
        (manager, store, time)
    }

    #[tokio::test]
    async fn submit_creates_queued_full_fidelity_job() {
        let (manager, _, _) = manager();

        let job = manager
            .submit(InputRef::new(json!({"audio_path": "audio/a.mp3"})), 5, None)
            .await
            .unwrap();

        assert_eq!(job.id, "job-1");
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.priority, 5);
        assert_eq!(job.mode, crate::domain::GenerationMode::Full);
        assert_eq!(job.created_at, 1_000_000);

        let stored = manager.get_status("job-1").await.unwrap().unwrap();
        assert_eq!(stored, job);
    }

    #[tokio::test]
    async fn submit_honors_max_attempts_override() {
        let (manager, _, _) = manager();
        let job = manager
            .submit(InputRef::new(json!({})), 10, Some(2))
            .await
            .unwrap();
        assert_eq!(job.max_attempts, 2);
    }

    #[tokio::test]
    async fn stats_count_by_status() {
        let (manager, store, _) = manager();
        manager.submit(InputRef::new(json!({})), 10, None).await.unwrap();
        manager.submit(InputRef::new(json!({})), 10, None).await.unwrap();
        store.claim("worker-a", "colab").await.unwrap();

        let stats = manager.get_stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.queued, 1);
        assert_eq!(stats.claimed, 1);
    }

    #[tokio::test]
    async fn monitor_reclaims_aged_claims_and_stops_cleanly() {
        let (manager, store, time) = manager();
        let job = manager.submit(InputRef::new(json!({})), 10, None).await.unwrap();
        store.claim("worker-a", "colab").await.unwrap();

        time.advance(120_000);
        manager.start_monitor(Duration::from_millis(5), Duration::from_secs(60));
        // Double start is a no-op, not a second task
        manager.start_monitor(Duration::from_millis(5), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_millis(50)).await;
        manager.stop_monitor().await;

        let job = manager.get_status(&job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.attempt, 0);
    }
}
