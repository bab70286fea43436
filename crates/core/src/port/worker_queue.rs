// Worker Queue Port
// The queue surface a worker talks to, independent of transport.

use std::sync::Arc;

use crate::domain::{FailOutcome, JobRecord, JobStatus, OutputRef};
use crate::error::Result;
use crate::port::JobStore;
use async_trait::async_trait;

/// Queue operations available to a worker
///
/// Implementations:
/// - DirectQueue: in-process, straight onto a JobStore (file backend)
/// - QueueClient (sdk): JSON-RPC against a remote daemon
#[async_trait]
pub trait WorkerQueue: Send + Sync {
    async fn claim(&self, worker_id: &str, worker_type: &str) -> Result<Option<JobRecord>>;

    async fn update_progress(
        &self,
        id: &str,
        progress: u8,
        message: &str,
        status: Option<JobStatus>,
    ) -> Result<()>;

    async fn complete(
        &self,
        id: &str,
        worker_id: &str,
        output: &OutputRef,
        quality_score: Option<f64>,
        loop_score: Option<f64>,
    ) -> Result<()>;

    async fn fail(&self, id: &str, worker_id: &str, error: &str) -> Result<FailOutcome>;
}

/// In-process transport: delegates straight to the store
pub struct DirectQueue {
    store: Arc<dyn JobStore>,
}

impl DirectQueue {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl WorkerQueue for DirectQueue {
    async fn claim(&self, worker_id: &str, worker_type: &str) -> Result<Option<JobRecord>> {
        self.store.claim(worker_id, worker_type).await
    }

    async fn update_progress(
        &self,
        id: &str,
        progress: u8,
        message: &str,
        status: Option<JobStatus>,
    ) -> Result<()> {
        self.store.update_progress(id, progress, message, status).await
    }

    async fn complete(
        &self,
        id: &str,
        worker_id: &str,
        output: &OutputRef,
        quality_score: Option<f64>,
        loop_score: Option<f64>,
    ) -> Result<()> {
        self.store
            .complete(id, worker_id, output, quality_score, loop_score)
            .await
    }

    async fn fail(&self, id: &str, worker_id: &str, error: &str) -> Result<FailOutcome> {
        self.store.fail(id, worker_id, error).await
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// One observed call against the mock queue
    #[derive(Debug, Clone, PartialEq)]
    pub enum QueueEvent {
        Progress {
            id: String,
            progress: u8,
            message: String,
            status: Option<JobStatus>,
        },
        Complete {
            id: String,
            worker_id: String,
            output: serde_json::Value,
            quality_score: Option<f64>,
            loop_score: Option<f64>,
        },
        Fail {
            id: String,
            worker_id: String,
            error: String,
        },
    }

    /// Scripted queue for worker loop tests
    ///
    /// `claim` pops pre-loaded answers (empty script = no work);
    /// progress/complete/fail record events and can be told to error a
    /// fixed number of times to exercise retry and swallowing paths.
    pub struct MockWorkerQueue {
        claims: Mutex<VecDeque<Option<JobRecord>>>,
        events: Mutex<Vec<QueueEvent>>,
        progress_errors_remaining: Mutex<usize>,
        complete_errors_remaining: Mutex<usize>,
        fail_errors_remaining: Mutex<usize>,
    }

    impl MockWorkerQueue {
        pub fn new() -> Self {
            Self {
                claims: Mutex::new(VecDeque::new()),
                events: Mutex::new(Vec::new()),
                progress_errors_remaining: Mutex::new(0),
                complete_errors_remaining: Mutex::new(0),
                fail_errors_remaining: Mutex::new(0),
            }
        }

        pub fn push_claim(&self, job: Option<JobRecord>) {
            self.claims.lock().unwrap().push_back(job);
        }

        pub fn fail_progress_times(&self, n: usize) {
            *self.progress_errors_remaining.lock().unwrap() = n;
        }

        pub fn fail_complete_times(&self, n: usize) {
            *self.complete_errors_remaining.lock().unwrap() = n;
        }

        pub fn fail_fail_times(&self, n: usize) {
            *self.fail_errors_remaining.lock().unwrap() = n;
        }

        pub fn events(&self) -> Vec<QueueEvent> {
            self.events.lock().unwrap().clone()
        }

        fn take_error(counter: &Mutex<usize>) -> bool {
            let mut remaining = counter.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                true
            } else {
                false
            }
        }
    }

    impl Default for MockWorkerQueue {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl WorkerQueue for MockWorkerQueue {
        async fn claim(&self, _worker_id: &str, _worker_type: &str) -> Result<Option<JobRecord>> {
            Ok(self.claims.lock().unwrap().pop_front().flatten())
        }

        async fn update_progress(
            &self,
            id: &str,
            progress: u8,
            message: &str,
            status: Option<JobStatus>,
        ) -> Result<()> {
            if Self::take_error(&self.progress_errors_remaining) {
                return Err(AppError::Transport("progress dropped".to_string()));
            }
            self.events.lock().unwrap().push(QueueEvent::Progress {
                id: id.to_string(),
                progress,
                message: message.to_string(),
                status,
            });
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
            if Self::take_error(&self.complete_errors_remaining) {
                return Err(AppError::Transport("complete dropped".to_string()));
            }
            self.events.lock().unwrap().push(QueueEvent::Complete {
                id: id.to_string(),
                worker_id: worker_id.to_string(),
                output: output.as_value().clone(),
                quality_score,
                loop_score,
            });
            Ok(())
        }

        async fn fail(&self, id: &str, worker_id: &str, error: &str) -> Result<FailOutcome> {
            if Self::take_error(&self.fail_errors_remaining) {
                return Err(AppError::Transport("fail dropped".to_string()));
            }
            self.events.lock().unwrap().push(QueueEvent::Fail {
                id: id.to_string(),
                worker_id: worker_id.to_string(),
                error: error.to_string(),
            });
            Ok(FailOutcome::Requeued { attempt: 1 })
        }
    }
}
