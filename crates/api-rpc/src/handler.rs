//! RPC Method Handlers
//!
//! One method per JobStore primitive plus submit/status/stats through
//! the QueueManager. Handlers translate wire shapes; all queue
//! semantics live behind the store.

use crate::error::to_rpc_error;
use crate::types::{
    AckResponse, ClaimRequest, ClaimResponse, CompleteRequest, FailRequest, FailResponse,
    ProgressRequest, StatsRequest, StatsResponse, StatusRequest, StatusResponse, SubmitRequest,
    SubmitResponse,
};
use jsonrpsee::types::ErrorObjectOwned;
use renderq_core::application::QueueManager;
use renderq_core::domain::{FailOutcome, InputRef, OutputRef};
use renderq_core::port::JobStore;
use std::sync::Arc;
use tracing::info;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    queue_manager: Arc<QueueManager>,
    store: Arc<dyn JobStore>,
}

impl RpcHandler {
    pub fn new(queue_manager: Arc<QueueManager>) -> Self {
        let store = queue_manager.store();
        Self {
            queue_manager,
            store,
        }
    }

    /// queue.submit.v1
    pub async fn submit(&self, params: SubmitRequest) -> Result<SubmitResponse, ErrorObjectOwned> {
        let job = self
            .queue_manager
            .submit(
                InputRef::new(params.input),
                params.priority,
                params.max_attempts,
            )
            .await
            .map_err(to_rpc_error)?;

        info!(job_id = %job.id, priority = job.priority, "Job submitted");
        Ok(SubmitResponse { job })
    }

    /// queue.claim.v1
    pub async fn claim(&self, params: ClaimRequest) -> Result<ClaimResponse, ErrorObjectOwned> {
        let job = self
            .store
            .claim(&params.worker_id, &params.worker_type)
            .await
            .map_err(to_rpc_error)?;

        if let Some(job) = &job {
            info!(job_id = %job.id, worker_id = %params.worker_id, "Job claimed");
        }
        Ok(ClaimResponse { job })
    }

    /// queue.progress.v1
    pub async fn progress(&self, params: ProgressRequest) -> Result<AckResponse, ErrorObjectOwned> {
        self.store
            .update_progress(
                &params.job_id,
                params.progress,
                &params.message,
                params.status,
            )
            .await
            .map_err(to_rpc_error)?;

        Ok(AckResponse { ok: true })
    }

    /// queue.complete.v1
    pub async fn complete(&self, params: CompleteRequest) -> Result<AckResponse, ErrorObjectOwned> {
        self.store
            .complete(
                &params.job_id,
                &params.worker_id,
                &OutputRef::new(params.output),
                params.quality_score,
                params.loop_score,
            )
            .await
            .map_err(to_rpc_error)?;

        info!(job_id = %params.job_id, worker_id = %params.worker_id, "Job completed");
        Ok(AckResponse { ok: true })
    }

    /// queue.fail.v1
    pub async fn fail(&self, params: FailRequest) -> Result<FailResponse, ErrorObjectOwned> {
        let outcome = self
            .store
            .fail(&params.job_id, &params.worker_id, &params.error)
            .await
            .map_err(to_rpc_error)?;

        let response = match outcome {
            FailOutcome::Requeued { attempt } => FailResponse {
                ok: true,
                status: "queued".to_string(),
                attempt,
            },
            FailOutcome::Dead { attempt } => FailResponse {
                ok: true,
                status: "dead".to_string(),
                attempt,
            },
            FailOutcome::Ignored { status } => {
                // Report the attempt counter as stored so the caller sees
                // a consistent picture of the job it lost
                let attempt = self
                    .store
                    .get(&params.job_id)
                    .await
                    .map_err(to_rpc_error)?
                    .map(|job| job.attempt)
                    .unwrap_or(0);
                FailResponse {
                    ok: false,
                    status: status.as_str().to_string(),
                    attempt,
                }
            }
        };

        info!(
            job_id = %params.job_id,
            status = %response.status,
            attempt = response.attempt,
            "Failure reported"
        );
        Ok(response)
    }

    /// queue.status.v1
    pub async fn status(&self, params: StatusRequest) -> Result<StatusResponse, ErrorObjectOwned> {
        let job = self
            .queue_manager
            .get_status(&params.job_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(StatusResponse { job })
    }

    /// queue.stats.v1
    pub async fn stats(&self, _params: StatsRequest) -> Result<StatsResponse, ErrorObjectOwned> {
        let stats = self.queue_manager.get_stats().await.map_err(to_rpc_error)?;
        Ok(StatsResponse { stats })
    }
}
