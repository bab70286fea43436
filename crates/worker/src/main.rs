//! renderq worker - Main Entry Point
//!
//! Ephemeral generation worker: claims jobs from a queue (remote daemon
//! or local file store), drives the render command for each one, and
//! reports the outcome. Designed to run on borrowed GPU time: it can
//! self-terminate after a configurable idle stretch.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use renderq_core::application::{shutdown_channel, WorkerConfig, WorkerRunner};
use renderq_core::port::{DirectQueue, WorkerQueue};
use renderq_infra_file::FileJobStore;
use renderq_infra_process::CommandPipeline;
use renderq_sdk::QueueClient;

const DEFAULT_QUEUE_DIR: &str = "~/.renderq/queue";
const DEFAULT_WORK_DIR: &str = "~/.renderq/work";

#[derive(Parser, Debug)]
#[command(name = "renderq-worker", version, about = "renderq generation worker")]
struct Args {
    /// Daemon URL for remote operation (wins over --queue-dir)
    #[arg(long, env = "RENDERQ_SERVER")]
    server: Option<String>,

    /// Queue directory for local single-host operation
    #[arg(long, env = "RENDERQ_QUEUE_DIR", default_value = DEFAULT_QUEUE_DIR)]
    queue_dir: String,

    /// Worker identity recorded on claims (generated when absent)
    #[arg(long, env = "RENDERQ_WORKER_ID")]
    worker_id: Option<String>,

    /// Pool label recorded alongside claims
    #[arg(long = "type", env = "RENDERQ_WORKER_TYPE", default_value = "gpu")]
    worker_type: String,

    /// Seconds to sleep between polls when the queue is empty
    #[arg(long, env = "RENDERQ_POLL_INTERVAL", default_value_t = 15)]
    poll_interval: u64,

    /// Exit after this many minutes without work (0 = run forever)
    #[arg(long, env = "RENDERQ_MAX_IDLE", default_value_t = 0)]
    max_idle: u64,

    /// Render command invoked per claimed job
    #[arg(long, env = "RENDERQ_PIPELINE_CMD")]
    pipeline_cmd: String,

    /// Scratch directory for per-job output
    #[arg(long, env = "RENDERQ_WORK_DIR", default_value = DEFAULT_WORK_DIR)]
    work_dir: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("renderq=info"))
        .expect("Failed to create env filter");
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .init();

    let args = Args::parse();

    let worker_id = args
        .worker_id
        .unwrap_or_else(|| format!("worker-{}", &uuid::Uuid::new_v4().to_string()[..8]));

    // Transport: remote daemon when a server URL is given, otherwise
    // straight onto the shared file store
    let queue: Arc<dyn WorkerQueue> = match &args.server {
        Some(url) => {
            info!(server = %url, "Using remote queue");
            Arc::new(QueueClient::connect(url)?)
        }
        None => {
            let queue_dir = shellexpand::tilde(&args.queue_dir).into_owned();
            info!(queue_dir = %queue_dir, "Using local file queue");
            let store = FileJobStore::open(&queue_dir)
                .await
                .map_err(|e| anyhow::anyhow!("File store open failed: {}", e))?;
            Arc::new(DirectQueue::new(Arc::new(store)))
        }
    };

    let work_dir = shellexpand::tilde(&args.work_dir).into_owned();
    let pipeline = Arc::new(CommandPipeline::new(&args.pipeline_cmd, work_dir));

    let mut config = WorkerConfig::new(worker_id, args.worker_type);
    config.poll_interval = Duration::from_secs(args.poll_interval);
    config.max_idle = Duration::from_secs(args.max_idle * 60);

    let runner = Arc::new(WorkerRunner::new(config, queue, pipeline));

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            shutdown_tx.shutdown();
        }
    });

    runner
        .run(shutdown_rx)
        .await
        .map_err(|e| anyhow::anyhow!("Worker loop failed: {}", e))?;

    let session = runner.session();
    info!(
        jobs_completed = session.jobs_completed,
        jobs_failed = session.jobs_failed,
        generation_secs = session.generation_time.as_secs(),
        "Worker session finished"
    );

    Ok(())
}
