// Worker Runner - poll, claim, generate, report

pub mod constants;
mod shutdown;

use constants::*;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::domain::{FailOutcome, JobRecord, JobStatus};
use crate::error::{AppError, Result};
use crate::port::{GenerationPipeline, PipelineOutput, ProgressSink, WorkerQueue};

/// Worker loop configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Identity recorded on every claim (e.g. hostname + pid)
    pub worker_id: String,
    /// Pool label recorded alongside the claim (e.g. "gpu")
    pub worker_type: String,
    /// Sleep between polls when the queue is empty
    pub poll_interval: Duration,
    /// Exit the loop after this much continuous idle time
    /// (zero = run until shutdown)
    pub max_idle: Duration,
    /// Delay between retries of claim/complete/fail calls
    pub call_retry_delay: Duration,
}

impl WorkerConfig {
    pub fn new(worker_id: impl Into<String>, worker_type: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            worker_type: worker_type.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_idle: Duration::ZERO,
            call_retry_delay: QUEUE_CALL_RETRY_DELAY,
        }
    }
}

/// Counters accumulated over one worker session
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerSession {
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub generation_time: Duration,
}

/// Pull-based worker loop: claims one job at a time, runs the
/// generation pipeline with panic isolation, and reports the outcome
/// back through the queue.
pub struct WorkerRunner {
    config: WorkerConfig,
    queue: Arc<dyn WorkerQueue>,
    pipeline: Arc<dyn GenerationPipeline>,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    generation_millis: AtomicU64,
}

impl WorkerRunner {
    pub fn new(
        config: WorkerConfig,
        queue: Arc<dyn WorkerQueue>,
        pipeline: Arc<dyn GenerationPipeline>,
    ) -> Self {
        Self {
            config,
            queue,
            pipeline,
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            generation_millis: AtomicU64::new(0),
        }
    }

    /// Counters accumulated so far in this session
    pub fn session(&self) -> WorkerSession {
        WorkerSession {
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            generation_time: Duration::from_millis(self.generation_millis.load(Ordering::Relaxed)),
        }
    }

    /// Run the poll loop until shutdown or the idle limit
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(
            worker_id = %self.config.worker_id,
            worker_type = %self.config.worker_type,
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Worker started"
        );
        let mut idle_since = Instant::now();
        loop {
            // Check for shutdown signal
            if shutdown.is_shutdown() {
                info!("Worker shutting down");
                break;
            }
            match self.run_once().await {
                Ok(true) => {
                    idle_since = Instant::now();
                }
                Ok(false) => {
                    let idle = idle_since.elapsed();
                    if !self.config.max_idle.is_zero() && idle >= self.config.max_idle {
                        info!(idle_secs = idle.as_secs(), "Idle limit reached, worker exiting");
                        break;
                    }
                    debug!("No job available");
                    // Sleep through the poll interval (or wake on shutdown)
                    tokio::select! {
                        _ = sleep(self.config.poll_interval) => {},
                        _ = shutdown.wait() => {
                            info!("Worker interrupted during idle");
                            break;
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "Worker cycle error");
                    tokio::select! {
                        _ = sleep(self.config.poll_interval) => {},
                        _ = shutdown.wait() => {
                            info!("Worker interrupted during error recovery");
                            break;
                        }
                    }
                }
            }
        }
        let session = self.session();
        info!(
            jobs_completed = session.jobs_completed,
            jobs_failed = session.jobs_failed,
            generation_secs = session.generation_time.as_secs(),
            "Worker stopped"
        );
        Ok(())
    }

    /// Poll once and process a job if one was claimed (returns true
    /// when a job was processed)
    pub async fn run_once(&self) -> Result<bool> {
        let claimed = self
            .with_retry("claim", || async {
                self.queue
                    .claim(&self.config.worker_id, &self.config.worker_type)
                    .await
            })
            .await?;
        let Some(job) = claimed else {
            return Ok(false);
        };

        info!(
            job_id = %job.id,
            priority = job.priority,
            attempt = job.attempt,
            "Claimed job"
        );
        self.process(job).await;
        Ok(true)
    }

    async fn process(&self, job: JobRecord) {
        let started = Instant::now();
        let job = Arc::new(job);
        let sink = QueueProgressSink {
            queue: Arc::clone(&self.queue),
            job_id: job.id.clone(),
        };

        // Run the pipeline on its own task so a panic inside it ends
        // the job, not the worker loop
        let pipeline = Arc::clone(&self.pipeline);
        let job_for_exec = Arc::clone(&job);
        let sink_for_exec = sink.clone();
        let handle = tokio::task::spawn(async move {
            pipeline.generate(&job_for_exec, &sink_for_exec).await
        });

        match handle.await {
            Ok(Ok(output)) => {
                self.finish_job(&job, output).await;
            }
            Ok(Err(e)) => {
                self.fail_job(&job, &e.to_string()).await;
            }
            Err(join_err) => {
                let reason = if join_err.is_panic() {
                    "generation pipeline panicked"
                } else {
                    "generation pipeline cancelled"
                };
                error!(job_id = %job.id, error = %join_err, "Pipeline did not finish");
                self.fail_job(&job, reason).await;
            }
        }
        self.generation_millis
            .fetch_add(started.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    async fn finish_job(&self, job: &JobRecord, output: PipelineOutput) {
        // The upload step is the worker's own report; like all progress
        // it is advisory and may be dropped
        if let Err(e) = self
            .queue
            .update_progress(&job.id, UPLOAD_PROGRESS, UPLOAD_MESSAGE, Some(JobStatus::Uploading))
            .await
        {
            debug!(job_id = %job.id, error = %e, "Progress report dropped");
        }

        let result = self
            .with_retry("complete", || async {
                self.queue
                    .complete(
                        &job.id,
                        &self.config.worker_id,
                        &output.output,
                        output.quality_score,
                        output.loop_score,
                    )
                    .await
            })
            .await;
        match result {
            Ok(()) => {
                info!(job_id = %job.id, "Job completed");
                self.jobs_completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                // The stale-claim monitor will recover the job
                error!(job_id = %job.id, error = %e, "Completion report failed, giving up");
                self.jobs_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    async fn fail_job(&self, job: &JobRecord, error_msg: &str) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        let result = self
            .with_retry("fail", || async {
                self.queue
                    .fail(&job.id, &self.config.worker_id, error_msg)
                    .await
            })
            .await;
        match result {
            Ok(FailOutcome::Requeued { attempt }) => {
                warn!(job_id = %job.id, attempt, error = error_msg, "Job failed, requeued");
            }
            Ok(FailOutcome::Dead { attempt }) => {
                error!(job_id = %job.id, attempt, error = error_msg, "Job dead-lettered");
            }
            Ok(FailOutcome::Ignored { status }) => {
                warn!(job_id = %job.id, status = %status, "Failure report ignored, job had moved on");
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Failure report failed, giving up");
            }
        }
    }

    /// Retry a queue call a bounded number of times before giving up.
    /// Progress reports never come through here; they are advisory and
    /// swallowed at the sink instead.
    async fn with_retry<T, F, Fut>(&self, op: &str, call: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_err = None;
        for attempt in 1..=QUEUE_CALL_ATTEMPTS {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(op, attempt, error = %e, "Queue call failed");
                    last_err = Some(e);
                    if attempt < QUEUE_CALL_ATTEMPTS {
                        sleep(self.config.call_retry_delay).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| AppError::Internal("queue call failed".to_string())))
    }
}

/// Forwards pipeline milestones to the queue. Delivery failures are
/// swallowed here and only here: progress is advisory and must never
/// abort a generation. Claim/complete/fail always propagate errors.
#[derive(Clone)]
struct QueueProgressSink {
    queue: Arc<dyn WorkerQueue>,
    job_id: String,
}

#[async_trait]
impl ProgressSink for QueueProgressSink {
    async fn report(&self, progress: u8, message: &str) {
        if let Err(e) = self
            .queue
            .update_progress(&self.job_id, progress, message, Some(JobStatus::Generating))
            .await
        {
            debug!(job_id = %self.job_id, progress, error = %e, "Progress report dropped");
        }
    }
}
