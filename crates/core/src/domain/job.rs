// Job Domain Model

use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, Result};

/// Job ID (UUID v4)
pub type JobId = String;

/// Worker identifier, chosen by the worker process itself
pub type WorkerId = String;

/// Default retry budget for a job
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Default submission priority (lower = served first)
pub const DEFAULT_PRIORITY: i32 = 10;

/// Message written when the monitor reclaims an expired claim
pub const RECLAIM_MESSAGE: &str = "requeued: claim timed out";

/// Message written on successful completion
pub const COMPLETE_MESSAGE: &str = "generation complete";

/// Job status. Lowercase on the wire and at rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Claimed,
    Generating,
    Uploading,
    Complete,
    /// Transient failure marker. The store primitives requeue or
    /// dead-letter directly and never persist this value; it exists as a
    /// stats bucket.
    Failed,
    Dead,
}

impl JobStatus {
    /// A worker currently owns the job.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            JobStatus::Claimed | JobStatus::Generating | JobStatus::Uploading
        )
    }

    /// COMPLETE and DEAD accept no further queue-internal mutation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Dead)
    }

    /// Position within the in-flight progression. Worker-reported status
    /// changes may only step forward along it.
    fn stage_rank(&self) -> Option<u8> {
        match self {
            JobStatus::Claimed => Some(0),
            JobStatus::Generating => Some(1),
            JobStatus::Uploading => Some(2),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Claimed => "claimed",
            JobStatus::Generating => "generating",
            JobStatus::Uploading => "uploading",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
            JobStatus::Dead => "dead",
        }
    }

    pub fn parse(s: &str) -> Option<JobStatus> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "claimed" => Some(JobStatus::Claimed),
            "generating" => Some(JobStatus::Generating),
            "uploading" => Some(JobStatus::Uploading),
            "complete" => Some(JobStatus::Complete),
            "failed" => Some(JobStatus::Failed),
            "dead" => Some(JobStatus::Dead),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Generation fidelity requested for a job. Submission always writes
/// `Full`; `Fast` is the degraded preview mode some worker runtimes fall
/// back to and is accepted on read for compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    Full,
    Fast,
}

impl GenerationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationMode::Full => "full",
            GenerationMode::Fast => "fast",
        }
    }

    pub fn parse(s: &str) -> Option<GenerationMode> {
        match s {
            "full" => Some(GenerationMode::Full),
            "fast" => Some(GenerationMode::Fast),
            _ => None,
        }
    }
}

impl std::fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Opaque input reference: source media pointer plus generation
/// parameters. Owned by the submitter; the queue hands it back verbatim
/// to whichever worker claims the job and never interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRef(serde_json::Value);

impl InputRef {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

/// Opaque output reference, set only on COMPLETE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRef(serde_json::Value);

impl OutputRef {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

/// Result of a fail() report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Attempts remain; the job went back to QUEUED.
    Requeued { attempt: i32 },
    /// Attempts exhausted; the job is dead-lettered.
    Dead { attempt: i32 },
    /// The job was not in flight (already reclaimed, finished or
    /// dead-lettered); the report changed nothing.
    Ignored { status: JobStatus },
}

/// Counts by status plus total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: i64,
    pub queued: i64,
    pub claimed: i64,
    pub generating: i64,
    pub uploading: i64,
    pub complete: i64,
    pub failed: i64,
    pub dead: i64,
}

impl QueueStats {
    pub fn record(&mut self, status: JobStatus) {
        self.total += 1;
        match status {
            JobStatus::Queued => self.queued += 1,
            JobStatus::Claimed => self.claimed += 1,
            JobStatus::Generating => self.generating += 1,
            JobStatus::Uploading => self.uploading += 1,
            JobStatus::Complete => self.complete += 1,
            JobStatus::Failed => self.failed += 1,
            JobStatus::Dead => self.dead += 1,
        }
    }
}

/// A generation job record: the single entity of the dispatch queue.
///
/// Created QUEUED by the submission side and mutated exclusively through
/// the JobStore primitives. COMPLETE and DEAD are terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub status: JobStatus,
    pub created_at: i64, // epoch ms
    pub updated_at: i64,

    // Input
    pub input: InputRef,
    pub priority: i32,
    pub mode: GenerationMode,

    // Worker ownership
    pub claimed_by: Option<WorkerId>,
    pub claimed_at: Option<i64>,
    pub worker_type: Option<String>,

    // Advisory progress
    pub progress: u8,
    pub message: String,

    // Output
    pub output: Option<OutputRef>,
    pub quality_score: Option<f64>,
    pub loop_score: Option<f64>,

    // Retry
    pub attempt: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
}

impl JobRecord {
    /// Create a new QUEUED record.
    ///
    /// `id` and `created_at` are injected via the id/time providers, never
    /// generated here.
    pub fn new(id: impl Into<String>, created_at: i64, input: InputRef, priority: i32) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Queued,
            created_at,
            updated_at: created_at,
            input,
            priority,
            mode: GenerationMode::Full,
            claimed_by: None,
            claimed_at: None,
            worker_type: None,
            progress: 0,
            message: String::new(),
            output: None,
            quality_score: None,
            loop_score: None,
            attempt: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            last_error: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Create a test record with deterministic ID and timestamp
    /// (test-1/1000, test-2/2000, ...).
    ///
    /// **Note**: tests only. Production code injects id and time via
    /// providers.
    pub fn new_test(priority: i32) -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static TEST_COUNTER: AtomicU64 = AtomicU64::new(1);

        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let input = InputRef::new(serde_json::json!({
            "audio_path": format!("audio/test-{}.mp3", counter),
        }));
        Self::new(format!("test-{}", counter), (counter * 1000) as i64, input, priority)
    }

    /// Transition QUEUED -> CLAIMED for a worker.
    pub fn claim(&mut self, worker_id: &str, worker_type: &str, now_millis: i64) -> Result<()> {
        if self.status != JobStatus::Queued {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: JobStatus::Claimed,
            });
        }
        self.status = JobStatus::Claimed;
        self.claimed_by = Some(worker_id.to_string());
        self.claimed_at = Some(now_millis);
        self.worker_type = Some(worker_type.to_string());
        self.updated_at = now_millis;
        Ok(())
    }

    /// Apply a worker progress report.
    ///
    /// Advisory only: reports against a job that is no longer in flight
    /// are dropped, and the optional status steps only forward within
    /// CLAIMED -> GENERATING -> UPLOADING. Returns whether the report was
    /// applied.
    pub fn record_progress(
        &mut self,
        progress: u8,
        message: &str,
        status: Option<JobStatus>,
        now_millis: i64,
    ) -> bool {
        if !self.status.is_in_flight() {
            return false;
        }
        if let Some(next) = status {
            if let (Some(current_rank), Some(next_rank)) =
                (self.status.stage_rank(), next.stage_rank())
            {
                if next_rank >= current_rank {
                    self.status = next;
                }
            }
        }
        self.progress = progress.min(100);
        self.message = message.to_string();
        self.updated_at = now_millis;
        true
    }

    /// Transition an in-flight job to COMPLETE.
    ///
    /// Only the current claimant may complete: a report carrying any
    /// other worker's id rejects, so a worker whose claim was reclaimed
    /// cannot overwrite the state of whoever holds the job now. A second
    /// call on an already COMPLETE job is accepted without touching the
    /// stored output (idempotent). Any other status rejects.
    pub fn finish(
        &mut self,
        worker_id: &str,
        output: OutputRef,
        quality_score: Option<f64>,
        loop_score: Option<f64>,
        now_millis: i64,
    ) -> Result<()> {
        if self.status == JobStatus::Complete {
            return Ok(());
        }
        if !self.status.is_in_flight() {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: JobStatus::Complete,
            });
        }
        if self.claimed_by.as_deref() != Some(worker_id) {
            return Err(DomainError::NotClaimant {
                reporter: worker_id.to_string(),
                claimed_by: self.claimed_by.clone(),
            });
        }
        self.status = JobStatus::Complete;
        self.progress = 100;
        self.message = COMPLETE_MESSAGE.to_string();
        self.output = Some(output);
        self.quality_score = quality_score;
        self.loop_score = loop_score;
        self.updated_at = now_millis;
        Ok(())
    }

    /// Record a reported failure, consuming one attempt.
    ///
    /// Requeues while attempts remain, dead-letters once exhausted.
    /// Reports against a job that is not in flight, or from a worker
    /// that is not the current claimant, are ignored and do not consume
    /// an attempt.
    pub fn mark_failed(&mut self, worker_id: &str, error: &str, now_millis: i64) -> FailOutcome {
        if !self.status.is_in_flight() || self.claimed_by.as_deref() != Some(worker_id) {
            return FailOutcome::Ignored {
                status: self.status,
            };
        }
        self.attempt += 1;
        self.last_error = Some(error.to_string());
        self.updated_at = now_millis;
        if self.attempt >= self.max_attempts {
            self.status = JobStatus::Dead;
            self.message = format!("failed after {} attempts: {}", self.attempt, error);
            FailOutcome::Dead {
                attempt: self.attempt,
            }
        } else {
            self.status = JobStatus::Queued;
            self.claimed_by = None;
            self.claimed_at = None;
            self.message = format!("retry {}/{}: {}", self.attempt, self.max_attempts, error);
            FailOutcome::Requeued {
                attempt: self.attempt,
            }
        }
    }

    /// Return an abandoned claim to the queue.
    ///
    /// Unlike `mark_failed` this does not consume an attempt: a vanished
    /// worker is not the job's fault.
    pub fn release(&mut self, message: &str, now_millis: i64) -> Result<()> {
        if !self.status.is_in_flight() {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: JobStatus::Queued,
            });
        }
        self.status = JobStatus::Queued;
        self.claimed_by = None;
        self.claimed_at = None;
        self.message = message.to_string();
        self.updated_at = now_millis;
        Ok(())
    }

    /// In flight with a claim older than the cutoff.
    pub fn is_stale(&self, cutoff_millis: i64) -> bool {
        self.status.is_in_flight() && self.claimed_at.map_or(false, |t| t < cutoff_millis)
    }
}
