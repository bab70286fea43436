// Port Layer - Interfaces for external dependencies

pub mod id_provider; // For deterministic testing
pub mod job_store;
pub mod pipeline;
pub mod time_provider;
pub mod worker_queue;

// Re-exports
pub use id_provider::IdProvider;
pub use job_store::JobStore;
pub use pipeline::{
    GenerationPipeline, NullProgressSink, PipelineError, PipelineOutput, ProgressSink,
};
pub use time_provider::TimeProvider;
pub use worker_queue::{DirectQueue, WorkerQueue};
