//! renderq SDK - Rust Client Library
//!
//! Typed client for the renderq dispatch queue daemon. Submitters use
//! the direct methods; worker processes use it through the
//! [`WorkerQueue`](renderq_core::port::WorkerQueue) trait it implements.
//!
//! # Example
//!
//! ```no_run
//! use renderq_sdk::QueueClient;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = QueueClient::connect("http://127.0.0.1:8750")?;
//!
//!     let job = client
//!         .submit(json!({"audio_path": "track.mp3"}), 1, None)
//!         .await?;
//!     println!("Job submitted: {}", job.id);
//!
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod types;

pub use client::QueueClient;
pub use error::{Result, SdkError};
pub use types::{FailResponse, SubmitRequest};
