//! RPC Request/Response Types
//!
//! Wire shapes for the `queue.*.v1` JSON-RPC methods. JobRecord and
//! QueueStats serialize with their domain representation (lowercase
//! status strings, epoch-millis timestamps).

use renderq_core::domain::{JobRecord, JobStatus, QueueStats};
use serde::{Deserialize, Serialize};

/// queue.submit.v1 - Submit a generation job
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    /// Opaque input payload, handed back verbatim to the claiming worker
    pub input: serde_json::Value,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub max_attempts: Option<i32>,
}

fn default_priority() -> i32 {
    renderq_core::domain::job::DEFAULT_PRIORITY
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponse {
    pub job: JobRecord,
}

/// queue.claim.v1 - Claim the best eligible queued job
#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub worker_id: String,
    pub worker_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClaimResponse {
    /// None when the queue is empty (not an error)
    pub job: Option<JobRecord>,
}

/// queue.progress.v1 - Advisory progress report
#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    pub job_id: String,
    pub progress: u8,
    pub message: String,
    #[serde(default)]
    pub status: Option<JobStatus>,
}

/// Plain acknowledgement for progress/complete
#[derive(Debug, Clone, Serialize)]
pub struct AckResponse {
    pub ok: bool,
}

/// queue.complete.v1 - Report successful generation
#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub job_id: String,
    /// Reporting worker; the report only lands while this worker still
    /// holds the claim
    pub worker_id: String,
    /// Opaque output reference (rendered canvas location)
    pub output: serde_json::Value,
    #[serde(default)]
    pub quality_score: Option<f64>,
    #[serde(default)]
    pub loop_score: Option<f64>,
}

/// queue.fail.v1 - Report a failed generation attempt
#[derive(Debug, Deserialize)]
pub struct FailRequest {
    pub job_id: String,
    /// Reporting worker; the report only lands while this worker still
    /// holds the claim
    pub worker_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailResponse {
    /// false when the report was ignored because the job had moved on
    pub ok: bool,
    /// Job status after the report (queued, dead, or the status that
    /// made the report a no-op)
    pub status: String,
    /// Attempt counter after the report
    pub attempt: i32,
}

/// queue.status.v1 - Look up a single job
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub job: Option<JobRecord>,
}

/// queue.stats.v1 - Per-status queue counts
#[derive(Debug, Deserialize)]
pub struct StatsRequest {}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub stats: QueueStats,
}
