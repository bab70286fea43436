//! Simple SDK Example
//!
//! Submits a generation job and polls its status.
//!
//! # Usage
//!
//! 1. Start the daemon:
//!    ```bash
//!    cargo run --package renderq-daemon
//!    ```
//!
//! 2. Run this example:
//!    ```bash
//!    cargo run --example simple
//!    ```

use renderq_sdk::QueueClient;
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("renderq SDK - Simple Example");
    println!("============================\n");

    // 1. Connect to daemon
    println!("1. Connecting to daemon...");
    let client = QueueClient::connect("http://127.0.0.1:8750")?;
    println!("   ✓ Connected\n");

    // 2. Submit a job
    println!("2. Submitting a job...");
    let job = client
        .submit(
            json!({
                "audio_path": "tracks/example.mp3",
                "style": "memory_in_motion",
                "params": {"grain": 0.18, "saturation": 0.75}
            }),
            5,
            None,
        )
        .await?;

    println!("   ✓ Job submitted:");
    println!("     - ID: {}", job.id);
    println!("     - Status: {}", job.status);
    println!("     - Priority: {}\n", job.priority);

    // 3. Poll for a while
    println!("3. Polling status (10s)...");
    for _ in 0..5 {
        tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
        if let Some(current) = client.status(&job.id).await? {
            println!(
                "     {} {:>3}% {}",
                current.status, current.progress, current.message
            );
        }
    }
    println!();

    // 4. Queue stats
    println!("4. Queue stats...");
    let stats = client.stats().await?;
    println!(
        "   ✓ total={} queued={} claimed={} complete={} dead={}",
        stats.total, stats.queued, stats.claimed, stats.complete, stats.dead
    );

    println!("\n✓ Example completed");

    Ok(())
}
