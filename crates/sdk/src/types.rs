//! Wire types for the `queue.*.v1` methods, client side.

use renderq_core::domain::{JobRecord, JobStatus, QueueStats};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct SubmitRequest {
    pub input: serde_json::Value,
    pub priority: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    pub job: JobRecord,
}

#[derive(Debug, Serialize)]
pub struct ClaimRequest {
    pub worker_id: String,
    pub worker_type: String,
}

#[derive(Debug, Deserialize)]
pub struct ClaimResponse {
    pub job: Option<JobRecord>,
}

#[derive(Debug, Serialize)]
pub struct ProgressRequest {
    pub job_id: String,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
}

#[derive(Debug, Deserialize)]
pub struct AckResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct CompleteRequest {
    pub job_id: String,
    pub worker_id: String,
    pub output: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loop_score: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct FailRequest {
    pub job_id: String,
    pub worker_id: String,
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct FailResponse {
    pub ok: bool,
    pub status: String,
    pub attempt: i32,
}

#[derive(Debug, Serialize)]
pub struct StatusRequest {
    pub job_id: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    pub job: Option<JobRecord>,
}

#[derive(Debug, Deserialize)]
pub struct StatsResponse {
    pub stats: QueueStats,
}
