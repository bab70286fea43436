//! Queue Client Implementation

use crate::error::{Result, SdkError};
use crate::types::{
    AckResponse, ClaimRequest, ClaimResponse, CompleteRequest, FailRequest, FailResponse,
    ProgressRequest, StatsResponse, StatusRequest, StatusResponse, SubmitRequest, SubmitResponse,
};
use async_trait::async_trait;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use renderq_core::domain::{
    FailOutcome, JobRecord, JobStatus, OutputRef, QueueStats,
};
use renderq_core::error::AppError;
use renderq_core::port::WorkerQueue;
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Dispatch queue client.
///
/// Typed wrapper over the daemon's `queue.*.v1` JSON-RPC methods. Also
/// implements [`WorkerQueue`], so a worker loop can run against a remote
/// daemon the same way it runs against an in-process store.
///
/// # Example
///
/// ```no_run
/// use renderq_sdk::QueueClient;
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = QueueClient::connect("http://127.0.0.1:8750")?;
/// let job = client.submit(json!({"audio_path": "track.mp3"}), 1, None).await?;
/// println!("submitted {}", job.id);
/// # Ok(())
/// # }
/// ```
pub struct QueueClient {
    client: HttpClient,
}

impl QueueClient {
    /// Connect to a renderq daemon with the default request timeout
    pub fn connect(url: impl AsRef<str>) -> Result<Self> {
        Self::connect_with_timeout(url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn connect_with_timeout(url: impl AsRef<str>, timeout: Duration) -> Result<Self> {
        let client = HttpClientBuilder::default()
            .request_timeout(timeout)
            .build(url.as_ref())
            .map_err(|e| SdkError::Connection(format!("Failed to create client: {}", e)))?;

        Ok(Self { client })
    }

    /// Submit a generation job
    pub async fn submit(
        &self,
        input: serde_json::Value,
        priority: i32,
        max_attempts: Option<i32>,
    ) -> Result<JobRecord> {
        let request = SubmitRequest {
            input,
            priority,
            max_attempts,
        };
        let response: SubmitResponse = self
            .client
            .request("queue.submit.v1", rpc_params![request])
            .await?;
        Ok(response.job)
    }

    /// Claim the best eligible queued job. `Ok(None)` means the queue
    /// is empty.
    pub async fn claim(
        &self,
        worker_id: impl Into<String>,
        worker_type: impl Into<String>,
    ) -> Result<Option<JobRecord>> {
        let request = ClaimRequest {
            worker_id: worker_id.into(),
            worker_type: worker_type.into(),
        };
        let response: ClaimResponse = self
            .client
            .request("queue.claim.v1", rpc_params![request])
            .await?;
        Ok(response.job)
    }

    /// Advisory progress report
    pub async fn progress(
        &self,
        job_id: impl Into<String>,
        progress: u8,
        message: impl Into<String>,
        status: Option<JobStatus>,
    ) -> Result<()> {
        let request = ProgressRequest {
            job_id: job_id.into(),
            progress,
            message: message.into(),
            status,
        };
        let _: AckResponse = self
            .client
            .request("queue.progress.v1", rpc_params![request])
            .await?;
        Ok(())
    }

    /// Report successful generation. The report only lands while
    /// `worker_id` still holds the claim.
    pub async fn complete(
        &self,
        job_id: impl Into<String>,
        worker_id: impl Into<String>,
        output: serde_json::Value,
        quality_score: Option<f64>,
        loop_score: Option<f64>,
    ) -> Result<()> {
        let request = CompleteRequest {
            job_id: job_id.into(),
            worker_id: worker_id.into(),
            output,
            quality_score,
            loop_score,
        };
        let _: AckResponse = self
            .client
            .request("queue.complete.v1", rpc_params![request])
            .await?;
        Ok(())
    }

    /// Report a failed attempt; the response says whether the job was
    /// requeued, dead-lettered, or had already moved on
    pub async fn fail(
        &self,
        job_id: impl Into<String>,
        worker_id: impl Into<String>,
        error: impl Into<String>,
    ) -> Result<FailResponse> {
        let request = FailRequest {
            job_id: job_id.into(),
            worker_id: worker_id.into(),
            error: error.into(),
        };
        let response: FailResponse = self
            .client
            .request("queue.fail.v1", rpc_params![request])
            .await?;
        Ok(response)
    }

    /// Look up a single job
    pub async fn status(&self, job_id: impl Into<String>) -> Result<Option<JobRecord>> {
        let request = StatusRequest {
            job_id: job_id.into(),
        };
        let response: StatusResponse = self
            .client
            .request("queue.status.v1", rpc_params![request])
            .await?;
        Ok(response.job)
    }

    /// Per-status queue counts
    pub async fn stats(&self) -> Result<QueueStats> {
        let response: StatsResponse = self.client.request("queue.stats.v1", rpc_params![]).await?;
        Ok(response.stats)
    }
}

fn transport(err: SdkError) -> AppError {
    AppError::Transport(err.to_string())
}

/// Remote transport for the worker loop
#[async_trait]
impl WorkerQueue for QueueClient {
    async fn claim(
        &self,
        worker_id: &str,
        worker_type: &str,
    ) -> renderq_core::error::Result<Option<JobRecord>> {
        QueueClient::claim(self, worker_id, worker_type)
            .await
            .map_err(transport)
    }

    async fn update_progress(
        &self,
        id: &str,
        progress: u8,
        message: &str,
        status: Option<JobStatus>,
    ) -> renderq_core::error::Result<()> {
        QueueClient::progress(self, id, progress, message, status)
            .await
            .map_err(transport)
    }

    async fn complete(
        &self,
        id: &str,
        worker_id: &str,
        output: &OutputRef,
        quality_score: Option<f64>,
        loop_score: Option<f64>,
    ) -> renderq_core::error::Result<()> {
        QueueClient::complete(
            self,
            id,
            worker_id,
            output.as_value().clone(),
            quality_score,
            loop_score,
        )
        .await
        .map_err(transport)
    }

    async fn fail(
        &self,
        id: &str,
        worker_id: &str,
        error: &str,
    ) -> renderq_core::error::Result<FailOutcome> {
        let response = QueueClient::fail(self, id, worker_id, error)
            .await
            .map_err(transport)?;

        let outcome = match (response.ok, response.status.as_str()) {
            (true, "dead") => FailOutcome::Dead {
                attempt: response.attempt,
            },
            (true, _) => FailOutcome::Requeued {
                attempt: response.attempt,
            },
            (false, status) => FailOutcome::Ignored {
                status: JobStatus::parse(status).unwrap_or(JobStatus::Failed),
            },
        };
        Ok(outcome)
    }
}
