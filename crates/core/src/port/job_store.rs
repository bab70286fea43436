// Job Store Port (Interface)

use crate::domain::{FailOutcome, JobRecord, JobStatus, OutputRef, QueueStats};
use crate::error::Result;
use async_trait::async_trait;

/// Durable storage for job records.
///
/// Both backends (single-host file document, multi-host Postgres) sit
/// behind this trait; callers depend on the abstraction, never on a
/// concrete store. Every mutation is funneled through these primitives,
/// each responsible for its own atomicity.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new QUEUED record
    async fn enqueue(&self, record: &JobRecord) -> Result<()>;

    /// Atomically claim the best eligible QUEUED job for a worker
    ///
    /// Eligibility order: lowest priority value, then earliest
    /// created_at, then id. Returns None when nothing is queued.
    /// Concurrent calls can never hand the same job to two workers.
    async fn claim(&self, worker_id: &str, worker_type: &str) -> Result<Option<JobRecord>>;

    /// Best-effort progress report
    ///
    /// Applied only while the job is in flight; the optional status
    /// steps forward within CLAIMED -> GENERATING -> UPLOADING. Reports
    /// against a job that has moved on are silently ignored.
    async fn update_progress(
        &self,
        id: &str,
        progress: u8,
        message: &str,
        status: Option<JobStatus>,
    ) -> Result<()>;

    /// Transition an in-flight job to COMPLETE
    ///
    /// Applies only when `worker_id` is the current claimant; a report
    /// from a worker whose claim was reclaimed is ignored (with a
    /// warning), so it can never overwrite a newer claimant's state.
    /// Stores the output reference and pass-through scores, progress
    /// forced to 100. Idempotent on an already COMPLETE job. Unknown id
    /// is a NotFound error.
    async fn complete(
        &self,
        id: &str,
        worker_id: &str,
        output: &OutputRef,
        quality_score: Option<f64>,
        loop_score: Option<f64>,
    ) -> Result<()>;

    /// Report a generation failure, consuming one attempt
    ///
    /// Requeues while attempts remain, dead-letters once exhausted.
    /// A report against a job no longer in flight, or from a worker
    /// other than the current claimant, returns `FailOutcome::Ignored`
    /// and consumes nothing. Unknown id is a NotFound error.
    async fn fail(&self, id: &str, worker_id: &str, error: &str) -> Result<FailOutcome>;

    /// Requeue every in-flight job whose claimed_at is older than the
    /// cutoff, without consuming an attempt. Returns the count requeued.
    async fn reclaim_stale(&self, cutoff_millis: i64) -> Result<u64>;

    /// Fetch a record by id
    async fn get(&self, id: &str) -> Result<Option<JobRecord>>;

    /// Counts by status
    async fn stats(&self) -> Result<QueueStats>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::job::RECLAIM_MESSAGE;
    use crate::error::AppError;
    use crate::port::time_provider::SystemTimeProvider;
    use crate::port::TimeProvider;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// In-memory store for application-layer tests.
    ///
    /// Runs the same domain transition methods as the file backend, so
    /// tests against it exercise the real state machine.
    pub struct MemoryJobStore {
        jobs: Mutex<HashMap<String, JobRecord>>,
        time: Arc<dyn TimeProvider>,
    }

    impl MemoryJobStore {
        pub fn new() -> Self {
            Self::with_time(Arc::new(SystemTimeProvider))
        }

        pub fn with_time(time: Arc<dyn TimeProvider>) -> Self {
            Self {
                jobs: Mutex::new(HashMap::new()),
                time,
            }
        }

        /// Insert a record verbatim, bypassing the enqueue contract.
        pub fn seed(&self, record: JobRecord) {
            self.jobs.lock().unwrap().insert(record.id.clone(), record);
        }
    }

    impl Default for MemoryJobStore {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl JobStore for MemoryJobStore {
        async fn enqueue(&self, record: &JobRecord) -> Result<()> {
            self.jobs
                .lock()
                .unwrap()
                .insert(record.id.clone(), record.clone());
            Ok(())
        }

        async fn claim(&self, worker_id: &str, worker_type: &str) -> Result<Option<JobRecord>> {
            let now = self.time.now_millis();
            let mut jobs = self.jobs.lock().unwrap();

            let next_id = jobs
                .values()
                .filter(|j| j.status == JobStatus::Queued)
                .min_by(|a, b| {
                    (a.priority, a.created_at, a.id.as_str())
                        .cmp(&(b.priority, b.created_at, b.id.as_str()))
                })
                .map(|j| j.id.clone());

            let Some(id) = next_id else {
                return Ok(None);
            };
            let record = jobs
                .get_mut(&id)
                .ok_or_else(|| AppError::NotFound(id.clone()))?;
            record.claim(worker_id, worker_type, now)?;
            Ok(Some(record.clone()))
        }

        async fn update_progress(
            &self,
            id: &str,
            progress: u8,
            message: &str,
            status: Option<JobStatus>,
        ) -> Result<()> {
            let now = self.time.now_millis();
            if let Some(record) = self.jobs.lock().unwrap().get_mut(id) {
                record.record_progress(progress, message, status, now);
            }
            Ok(())
        }

        async fn complete(
            &self,
            id: &str,
            worker_id: &str,
            output: &OutputRef,
            quality_score: Option<f64>,
            loop_score: Option<f64>,
        ) -> Result<()> {
            let now = self.time.now_millis();
            let mut jobs = self.jobs.lock().unwrap();
            let record = jobs
                .get_mut(id)
                .ok_or_else(|| AppError::NotFound(id.to_string()))?;
            if record
                .finish(worker_id, output.clone(), quality_score, loop_score, now)
                .is_err()
            {
                tracing::warn!(job_id = %id, worker_id = %worker_id, status = %record.status, "Ignoring stale completion");
            }
            Ok(())
        }

        async fn fail(&self, id: &str, worker_id: &str, error: &str) -> Result<FailOutcome> {
            let now = self.time.now_millis();
            let mut jobs = self.jobs.lock().unwrap();
            let record = jobs
                .get_mut(id)
                .ok_or_else(|| AppError::NotFound(id.to_string()))?;
            Ok(record.mark_failed(worker_id, error, now))
        }

        async fn reclaim_stale(&self, cutoff_millis: i64) -> Result<u64> {
            let now = self.time.now_millis();
            let mut jobs = self.jobs.lock().unwrap();
            let mut count = 0u64;
            for record in jobs.values_mut() {
                if record.is_stale(cutoff_millis) && record.release(RECLAIM_MESSAGE, now).is_ok() {
                    count += 1;
                }
            }
            Ok(count)
        }

        async fn get(&self, id: &str) -> Result<Option<JobRecord>> {
            Ok(self.jobs.lock().unwrap().get(id).cloned())
        }

        async fn stats(&self) -> Result<QueueStats> {
            let jobs = self.jobs.lock().unwrap();
            let mut stats = QueueStats::default();
            for record in jobs.values() {
                stats.record(record.status);
            }
            Ok(stats)
        }
    }
}
