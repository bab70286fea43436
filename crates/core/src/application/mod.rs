// Application Layer - Use Cases and Services

pub mod monitor;
pub mod queue_manager;
pub mod worker;

// Re-exports
pub use monitor::StaleClaimMonitor;
pub use queue_manager::QueueManager;
pub use worker::{shutdown_channel, ShutdownSender, ShutdownToken, WorkerConfig, WorkerRunner};
