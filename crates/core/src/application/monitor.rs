// Stale-Claim Monitor
// Returns abandoned claims to the queue without consuming an attempt.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{debug, error, info};

use crate::application::worker::ShutdownToken;
use crate::error::Result;
use crate::port::{JobStore, TimeProvider};

/// Default time between monitor cycles (30s)
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(30);

/// Default age after which a claim counts as abandoned (30min)
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(30 * 60);

/// Background loop that requeues in-flight jobs whose claim has expired.
///
/// A vanished worker is not the job's fault, so reclamation never touches
/// the attempt counter. Multiple monitors against a shared backend race
/// harmlessly: requeueing is guarded by the in-flight precondition.
pub struct StaleClaimMonitor {
    store: Arc<dyn JobStore>,
    time: Arc<dyn TimeProvider>,
    cycle_interval: Duration,
    stale_after: Duration,
}

impl StaleClaimMonitor {
    pub fn new(store: Arc<dyn JobStore>, time: Arc<dyn TimeProvider>) -> Self {
        Self {
            store,
            time,
            cycle_interval: DEFAULT_MONITOR_INTERVAL,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }

    pub fn with_timing(mut self, cycle_interval: Duration, stale_after: Duration) -> Self {
        self.cycle_interval = cycle_interval;
        self.stale_after = stale_after;
        self
    }

    /// Run cycles until shutdown. Cycle errors are logged and the loop
    /// continues; a flaky backend must not kill the monitor.
    pub async fn run(&self, mut shutdown: ShutdownToken) {
        info!(
            interval_secs = self.cycle_interval.as_secs(),
            stale_after_secs = self.stale_after.as_secs(),
            "Stale-claim monitor started"
        );
        let mut tick = interval(self.cycle_interval);
        // The first tick fires immediately; skip it so a fresh daemon
        // does not scan before workers had any chance to report
        tick.tick().await;
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    match self.run_once().await {
                        Ok(0) => debug!("Monitor cycle: nothing stale"),
                        Ok(count) => info!(reclaimed = count, "Requeued stale claims"),
                        Err(e) => error!(error = %e, "Monitor cycle failed"),
                    }
                }
                _ = shutdown.wait() => {
                    info!("Stale-claim monitor stopped");
                    break;
                }
            }
        }
    }

    /// Scan once and requeue every claim older than the threshold.
    /// Returns the count reclaimed.
    pub async fn run_once(&self) -> Result<u64> {
        let cutoff = self.time.now_millis() - self.stale_after.as_millis() as i64;
        self.store.reclaim_stale(cutoff).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::worker::shutdown_channel;
    use crate::domain::{JobRecord, JobStatus};
    use crate::port::job_store::mocks::MemoryJobStore;
    use crate::port::time_provider::mocks::FixedTimeProvider;

    fn aged_setup() -> (Arc<MemoryJobStore>, Arc<FixedTimeProvider>) {
        let time = Arc::new(FixedTimeProvider::new(1_000_000));
        let store = Arc::new(MemoryJobStore::with_time(time.clone()));
        (store, time)
    }

    #[tokio::test]
    async fn reclaims_only_expired_claims() {
        let (store, time) = aged_setup();
        let monitor = StaleClaimMonitor::new(store.clone(), time.clone())
            .with_timing(Duration::from_millis(10), Duration::from_secs(60));

        store.enqueue(&JobRecord::new_test(10)).await.unwrap();
        store.enqueue(&JobRecord::new_test(10)).await.unwrap();
        let old = store.claim("worker-a", "colab").await.unwrap().unwrap();

        // Second claim happens just inside the staleness window
        time.advance(55_000);
        let fresh = store.claim("worker-b", "local").await.unwrap().unwrap();
        time.advance(10_000);

        let reclaimed = monitor.run_once().await.unwrap();
        assert_eq!(reclaimed, 1);

        let old = store.get(&old.id).await.unwrap().unwrap();
        assert_eq!(old.status, JobStatus::Queued);
        assert_eq!(old.attempt, 0);
        assert!(old.claimed_by.is_none());

        let fresh = store.get(&fresh.id).await.unwrap().unwrap();
        assert_eq!(fresh.status, JobStatus::Claimed);
    }

    #[tokio::test]
    async fn reclamation_spares_terminal_jobs() {
        let (store, time) = aged_setup();
        let monitor = StaleClaimMonitor::new(store.clone(), time.clone())
            .with_timing(Duration::from_millis(10), Duration::from_secs(60));

        store.enqueue(&JobRecord::new_test(10)).await.unwrap();
        let job = store.claim("worker-a", "colab").await.unwrap().unwrap();
        store
            .complete(
                &job.id,
                "worker-a",
                &crate::domain::OutputRef::new(serde_json::json!("out/1")),
                None,
                None,
            )
            .await
            .unwrap();

        time.advance(3_600_000);
        assert_eq!(monitor.run_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let (store, time) = aged_setup();
        let monitor = Arc::new(
            StaleClaimMonitor::new(store, time)
                .with_timing(Duration::from_millis(5), Duration::from_secs(60)),
        );

        let (sender, token) = shutdown_channel();
        let task = {
            let monitor = Arc::clone(&monitor);
            tokio::spawn(async move { monitor.run(token).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        sender.shutdown();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("shutdown should end the monitor")
            .unwrap();
    }
}
