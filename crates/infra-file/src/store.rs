// File-backed JobStore (Local Store)

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use renderq_core::domain::job::RECLAIM_MESSAGE;
use renderq_core::domain::{FailOutcome, JobRecord, JobStatus, OutputRef, QueueStats};
use renderq_core::error::{AppError, Result};
use renderq_core::port::time_provider::SystemTimeProvider;
use renderq_core::port::{JobStore, TimeProvider};
use tokio::sync::Mutex;
use tracing::warn;

use crate::document;

/// Single-host job store over one JSON document.
///
/// Every primitive holds the in-process mutex for its full read+write,
/// and the document is replaced atomically on disk, so a crash mid-write
/// never corrupts it.
///
/// Deployment constraint: correct only within one process group sharing
/// this mutex. Multiple independent server processes writing the same
/// document concurrently are not supported; use the Postgres store for
/// multi-host deployments.
pub struct FileJobStore {
    jobs_path: PathBuf,
    lock: Mutex<()>,
    time: Arc<dyn TimeProvider>,
}

impl FileJobStore {
    /// Open (or initialize) the store in `queue_dir`.
    pub async fn open(queue_dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_time(queue_dir, Arc::new(SystemTimeProvider)).await
    }

    pub async fn open_with_time(
        queue_dir: impl AsRef<Path>,
        time: Arc<dyn TimeProvider>,
    ) -> Result<Self> {
        let queue_dir = queue_dir.as_ref();
        tokio::fs::create_dir_all(queue_dir).await.map_err(|e| {
            AppError::Configuration(format!(
                "cannot create queue dir {}: {}",
                queue_dir.display(),
                e
            ))
        })?;

        let store = Self {
            jobs_path: queue_dir.join("jobs.json"),
            lock: Mutex::new(()),
            time,
        };
        if !store.jobs_path.exists() {
            document::save(&store.jobs_path, &HashMap::new()).await?;
        }
        Ok(store)
    }

    pub fn jobs_path(&self) -> &Path {
        &self.jobs_path
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn enqueue(&self, record: &JobRecord) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut jobs = document::load(&self.jobs_path).await?;
        jobs.insert(record.id.clone(), record.clone());
        document::save(&self.jobs_path, &jobs).await
    }

    async fn claim(&self, worker_id: &str, worker_type: &str) -> Result<Option<JobRecord>> {
        let _guard = self.lock.lock().await;
        let mut jobs = document::load(&self.jobs_path).await?;

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

        let now = self.time.now_millis();
        let record = jobs.get_mut(&id).ok_or_else(|| AppError::NotFound(id.clone()))?;
        record.claim(worker_id, worker_type, now)?;
        let claimed = record.clone();
        document::save(&self.jobs_path, &jobs).await?;
        Ok(Some(claimed))
    }

    async fn update_progress(
        &self,
        id: &str,
        progress: u8,
        message: &str,
        status: Option<JobStatus>,
    ) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut jobs = document::load(&self.jobs_path).await?;

        // Advisory: unknown ids and jobs that moved on are ignored
        let now = self.time.now_millis();
        let applied = match jobs.get_mut(id) {
            Some(record) => record.record_progress(progress, message, status, now),
            None => false,
        };
        if applied {
            document::save(&self.jobs_path, &jobs).await?;
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
        let _guard = self.lock.lock().await;
        let mut jobs = document::load(&self.jobs_path).await?;
        let record = jobs
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(id.to_string()))?;

        let now = self.time.now_millis();
        let before = record.clone();
        if record
            .finish(worker_id, output.clone(), quality_score, loop_score, now)
            .is_err()
        {
            // The job was reclaimed (and possibly re-claimed) since this
            // worker held it; a late completion must not overwrite the
            // newer attempt's state
            warn!(job_id = %id, worker_id = %worker_id, status = %record.status, "Ignoring stale completion");
            return Ok(());
        }
        if *record != before {
            document::save(&self.jobs_path, &jobs).await?;
        }
        Ok(())
    }

    async fn fail(&self, id: &str, worker_id: &str, error: &str) -> Result<FailOutcome> {
        let _guard = self.lock.lock().await;
        let mut jobs = document::load(&self.jobs_path).await?;
        let record = jobs
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(id.to_string()))?;

        let now = self.time.now_millis();
        let outcome = record.mark_failed(worker_id, error, now);
        if !matches!(outcome, FailOutcome::Ignored { .. }) {
            document::save(&self.jobs_path, &jobs).await?;
        }
        Ok(outcome)
    }

    async fn reclaim_stale(&self, cutoff_millis: i64) -> Result<u64> {
        let _guard = self.lock.lock().await;
        let mut jobs = document::load(&self.jobs_path).await?;

        let now = self.time.now_millis();
        let mut count = 0u64;
        for record in jobs.values_mut() {
            if record.is_stale(cutoff_millis) && record.release(RECLAIM_MESSAGE, now).is_ok() {
                count += 1;
            }
        }
        if count > 0 {
            document::save(&self.jobs_path, &jobs).await?;
        }
        Ok(count)
    }

    async fn get(&self, id: &str) -> Result<Option<JobRecord>> {
        let _guard = self.lock.lock().await;
        let jobs = document::load(&self.jobs_path).await?;
        Ok(jobs.get(id).cloned())
    }

    async fn stats(&self) -> Result<QueueStats> {
        let _guard = self.lock.lock().await;
        let jobs = document::load(&self.jobs_path).await?;
        let mut stats = QueueStats::default();
        for record in jobs.values() {
            stats.record(record.status);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use renderq_core::domain::InputRef;
    use renderq_core::port::time_provider::mocks::FixedTimeProvider;
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup() -> (FileJobStore, Arc<FixedTimeProvider>, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let time = Arc::new(FixedTimeProvider::new(1_000_000));
        let store = FileJobStore::open_with_time(dir.path(), time.clone())
            .await
            .unwrap();
        (store, time, dir)
    }

    fn job(id: &str, created_at: i64, priority: i32) -> JobRecord {
        JobRecord::new(
            id,
            created_at,
            InputRef::new(json!({"audio_path": format!("audio/{id}.mp3")})),
            priority,
        )
    }

    #[tokio::test]
    async fn claim_prefers_lower_priority_value() {
        let (store, _, _dir) = setup().await;
        store.enqueue(&job("j1", 1_000, 10)).await.unwrap();
        store.enqueue(&job("j2", 2_000, 5)).await.unwrap();

        let claimed = store.claim("worker-a", "colab").await.unwrap().unwrap();
        assert_eq!(claimed.id, "j2");
        assert_eq!(claimed.status, JobStatus::Claimed);
        assert_eq!(claimed.claimed_by.as_deref(), Some("worker-a"));
    }

    #[tokio::test]
    async fn claim_breaks_priority_ties_by_creation_time() {
        let (store, _, _dir) = setup().await;
        store.enqueue(&job("j1", 1_000, 10)).await.unwrap();
        store.enqueue(&job("j2", 2_000, 10)).await.unwrap();

        let claimed = store.claim("worker-a", "colab").await.unwrap().unwrap();
        assert_eq!(claimed.id, "j1");
    }

    #[tokio::test]
    async fn claim_on_empty_queue_returns_none() {
        let (store, _, _dir) = setup().await;
        assert!(store.claim("worker-a", "colab").await.unwrap().is_none());

        store.enqueue(&job("j1", 1_000, 10)).await.unwrap();
        store.claim("worker-a", "colab").await.unwrap().unwrap();
        // The only job is now claimed
        assert!(store.claim("worker-b", "local").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fail_requeues_then_dead_letters() {
        let (store, _, _dir) = setup().await;
        store.enqueue(&job("j1", 1_000, 10)).await.unwrap();

        store.claim("w", "local").await.unwrap().unwrap();
        let outcome = store.fail("j1", "w", "e1").await.unwrap();
        assert_eq!(outcome, FailOutcome::Requeued { attempt: 1 });
        let j = store.get("j1").await.unwrap().unwrap();
        assert_eq!(j.status, JobStatus::Queued);
        assert_eq!(j.message, "retry 1/3: e1");

        store.claim("w", "local").await.unwrap().unwrap();
        assert_eq!(
            store.fail("j1", "w", "e2").await.unwrap(),
            FailOutcome::Requeued { attempt: 2 }
        );

        store.claim("w", "local").await.unwrap().unwrap();
        assert_eq!(
            store.fail("j1", "w", "e3").await.unwrap(),
            FailOutcome::Dead { attempt: 3 }
        );
        let j = store.get("j1").await.unwrap().unwrap();
        assert_eq!(j.status, JobStatus::Dead);
        assert_eq!(j.last_error.as_deref(), Some("e3"));
    }

    #[tokio::test]
    async fn fail_on_unknown_id_is_not_found() {
        let (store, _, _dir) = setup().await;
        assert!(matches!(
            store.fail("missing", "w", "e").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn complete_is_idempotent() {
        let (store, _, _dir) = setup().await;
        store.enqueue(&job("j1", 1_000, 10)).await.unwrap();
        store.claim("w", "local").await.unwrap().unwrap();

        let output = OutputRef::new(json!("out/123"));
        store
            .complete("j1", "w", &output, Some(9.4), Some(8.8))
            .await
            .unwrap();
        store
            .complete("j1", "w", &OutputRef::new(json!("out/999")), None, None)
            .await
            .unwrap();

        let j = store.get("j1").await.unwrap().unwrap();
        assert_eq!(j.status, JobStatus::Complete);
        assert_eq!(j.progress, 100);
        assert_eq!(j.output, Some(output));
        assert_eq!(j.quality_score, Some(9.4));
    }

    #[tokio::test]
    async fn stale_completion_is_ignored() {
        let (store, time, _dir) = setup().await;
        store.enqueue(&job("j1", 1_000, 10)).await.unwrap();
        store.claim("worker-a", "colab").await.unwrap().unwrap();

        // Monitor reclaims, worker-b picks the job up again
        time.advance(3_600_000);
        store.reclaim_stale(time.now_millis() - 60_000).await.unwrap();
        store.claim("worker-b", "local").await.unwrap().unwrap();

        // worker-a reports late; worker-b's claim must survive
        store
            .complete("j1", "worker-a", &OutputRef::new(json!("out/stale")), None, None)
            .await
            .unwrap();
        let j = store.get("j1").await.unwrap().unwrap();
        assert_eq!(j.status, JobStatus::Claimed);
        assert_eq!(j.claimed_by.as_deref(), Some("worker-b"));
        assert!(j.output.is_none());

        // A late failure report from worker-a is ignored the same way
        assert_eq!(
            store.fail("j1", "worker-a", "late oom").await.unwrap(),
            FailOutcome::Ignored {
                status: JobStatus::Claimed
            }
        );
        let j = store.get("j1").await.unwrap().unwrap();
        assert_eq!(j.attempt, 0);
        assert_eq!(j.claimed_by.as_deref(), Some("worker-b"));

        // worker-b's own completion still lands
        store
            .complete("j1", "worker-b", &OutputRef::new(json!("out/fresh")), None, None)
            .await
            .unwrap();
        let j = store.get("j1").await.unwrap().unwrap();
        assert_eq!(j.status, JobStatus::Complete);
        assert_eq!(j.output, Some(OutputRef::new(json!("out/fresh"))));
    }

    #[tokio::test]
    async fn reclaim_does_not_consume_attempt() {
        let (store, time, _dir) = setup().await;
        store.enqueue(&job("j1", 1_000, 10)).await.unwrap();
        store.claim("worker-a", "colab").await.unwrap().unwrap();

        time.advance(3_600_000);
        let count = store.reclaim_stale(time.now_millis() - 1_800_000).await.unwrap();
        assert_eq!(count, 1);

        let j = store.get("j1").await.unwrap().unwrap();
        assert_eq!(j.status, JobStatus::Queued);
        assert_eq!(j.attempt, 0);
        assert!(j.claimed_by.is_none() && j.claimed_at.is_none());
        assert_eq!(j.message, RECLAIM_MESSAGE);
    }

    #[tokio::test]
    async fn progress_on_moved_on_job_is_silently_ignored() {
        let (store, _, _dir) = setup().await;
        store.enqueue(&job("j1", 1_000, 10)).await.unwrap();

        // Still queued (and one id that never existed): accepted, nothing applied
        store
            .update_progress("j1", 10, "starting", Some(JobStatus::Generating))
            .await
            .unwrap();
        store
            .update_progress("missing", 10, "starting", None)
            .await
            .unwrap();

        let j = store.get("j1").await.unwrap().unwrap();
        assert_eq!(j.status, JobStatus::Queued);
        assert_eq!(j.progress, 0);
    }

    #[tokio::test]
    async fn progress_applies_while_in_flight() {
        let (store, _, _dir) = setup().await;
        store.enqueue(&job("j1", 1_000, 10)).await.unwrap();
        store.claim("w", "local").await.unwrap().unwrap();

        store
            .update_progress("j1", 40, "building visual concept", Some(JobStatus::Generating))
            .await
            .unwrap();
        let j = store.get("j1").await.unwrap().unwrap();
        assert_eq!(j.status, JobStatus::Generating);
        assert_eq!(j.progress, 40);
        assert_eq!(j.message, "building visual concept");
    }

    #[tokio::test]
    async fn durability_round_trip() {
        let (store, time, dir) = setup().await;
        let record = job("j1", 1_000, 3).with_max_attempts(5);
        store.enqueue(&record).await.unwrap();

        // Reopen from disk, simulating a process restart
        drop(store);
        let reopened = FileJobStore::open_with_time(dir.path(), time).await.unwrap();
        let loaded = reopened.get("j1").await.unwrap().unwrap();
        assert_eq!(loaded, record);

        let stats = reopened.stats().await.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.queued, 1);
    }
}
