// Generation Pipeline Port
// Abstraction over the long-running external generation run a worker
// drives for each claimed job. The queue never looks inside it.

use crate::domain::{JobRecord, OutputRef};
use async_trait::async_trait;
use thiserror::Error;

/// What a finished pipeline hands back to the worker
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Opaque output reference (rendered canvas location)
    pub output: OutputRef,
    /// Post-hoc quality gate score, passed through unexamined
    pub quality_score: Option<f64>,
    /// Seamless-loop validation score, passed through unexamined
    pub loop_score: Option<f64>,
}

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Pipeline timeout after {0}ms")]
    Timeout(i64),

    #[error("Pipeline failed (exit {0})")]
    NonZeroExit(i32),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(String),
}

/// Milestone sink for advisory progress
///
/// Implementations must never fail the caller; delivery problems are
/// theirs to swallow.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, progress: u8, message: &str);
}

/// Sink that drops every report
pub struct NullProgressSink;

#[async_trait]
impl ProgressSink for NullProgressSink {
    async fn report(&self, _progress: u8, _message: &str) {}
}

/// Generation Pipeline trait
///
/// Implementations:
/// - CommandPipeline (infra-process): spawns the external render command
/// - MockPipeline (tests): scripted success/failure/panic
#[async_trait]
pub trait GenerationPipeline: Send + Sync {
    /// Run the full generation for a claimed job, reporting milestones
    /// through the sink as it goes.
    ///
    /// # Errors
    /// - PipelineError::SpawnFailed if the run cannot be started
    /// - PipelineError::Timeout if it exceeds its deadline
    /// - PipelineError::InvalidInput if the job input is malformed
    async fn generate(
        &self,
        job: &JobRecord,
        progress: &dyn ProgressSink,
    ) -> Result<PipelineOutput, PipelineError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Mock pipeline behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Succeed with the configured output
        Success,
        /// Always fail with message
        Fail(String),
        /// Panic with message (for panic isolation testing)
        Panic(String),
    }

    /// Mock Generation Pipeline for testing
    pub struct MockPipeline {
        behavior: Arc<Mutex<MockBehavior>>,
        output: serde_json::Value,
        quality_score: Option<f64>,
        loop_score: Option<f64>,
        call_count: Arc<Mutex<usize>>,
    }

    impl MockPipeline {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior: Arc::new(Mutex::new(behavior)),
                output: serde_json::json!("out/mock"),
                quality_score: Some(9.0),
                loop_score: Some(8.5),
                call_count: Arc::new(Mutex::new(0)),
            }
        }

        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success)
        }

        pub fn new_fail(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Fail(message.into()))
        }

        pub fn new_panic_inducing(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Panic(message.into()))
        }

        /// Override the success payload
        pub fn with_output(
            mut self,
            output: serde_json::Value,
            quality_score: Option<f64>,
            loop_score: Option<f64>,
        ) -> Self {
            self.output = output;
            self.quality_score = quality_score;
            self.loop_score = loop_score;
            self
        }

        pub fn set_behavior(&self, behavior: MockBehavior) {
            *self.behavior.lock().unwrap() = behavior;
        }

        pub fn call_count(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl GenerationPipeline for MockPipeline {
        async fn generate(
            &self,
            _job: &JobRecord,
            progress: &dyn ProgressSink,
        ) -> Result<PipelineOutput, PipelineError> {
            *self.call_count.lock().unwrap() += 1;

            let behavior = self.behavior.lock().unwrap().clone();

            match behavior {
                MockBehavior::Success => {
                    progress.report(50, "generating visuals").await;
                    progress.report(95, "encoding for web").await;
                    Ok(PipelineOutput {
                        output: OutputRef::new(self.output.clone()),
                        quality_score: self.quality_score,
                        loop_score: self.loop_score,
                    })
                }
                MockBehavior::Fail(msg) => Err(PipelineError::SpawnFailed(msg)),
                MockBehavior::Panic(msg) => {
                    panic!("{}", msg); // Actually panic for panic isolation testing
                }
            }
        }
    }
}
