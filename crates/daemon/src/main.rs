//! renderq daemon - Main Entry Point
//!
//! Always-on API side of the dispatch queue: picks a store backend from
//! the environment, serves the queue.*.v1 RPC surface, and runs the
//! stale-claim monitor.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use renderq_api_rpc::{RpcServer, RpcServerConfig};
use renderq_core::application::QueueManager;
use renderq_core::port::id_provider::UuidProvider;
use renderq_core::port::time_provider::SystemTimeProvider;
use renderq_core::port::JobStore;
use renderq_infra_file::FileJobStore;
use renderq_infra_postgres::{create_pool, run_migrations, PgJobStore};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_QUEUE_DIR: &str = "~/.renderq/queue";
const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 30;
const DEFAULT_STALE_AFTER_SECS: u64 = 30 * 60;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging
    let log_format = std::env::var("RENDERQ_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("renderq=info"))
        .expect("Failed to create env filter");

    match log_format.as_str() {
        "json" => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            // Development: Pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    info!("renderq daemon v{} starting...", VERSION);

    // 2. Pick the store backend: a database URL selects the shared
    // Postgres store, otherwise the single-host file store
    let store: Arc<dyn JobStore> = match std::env::var("RENDERQ_DATABASE_URL") {
        Ok(url) => {
            info!("Using Postgres store");
            let pool = create_pool(&url)
                .await
                .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
            run_migrations(&pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;
            Arc::new(PgJobStore::new(pool))
        }
        Err(_) => {
            let queue_dir = std::env::var("RENDERQ_QUEUE_DIR")
                .unwrap_or_else(|_| shellexpand::tilde(DEFAULT_QUEUE_DIR).into_owned());
            info!(queue_dir = %queue_dir, "Using file store");
            Arc::new(
                FileJobStore::open(&queue_dir)
                    .await
                    .map_err(|e| anyhow::anyhow!("File store open failed: {}", e))?,
            )
        }
    };

    // 3. Queue manager + stale-claim monitor
    let queue_manager = Arc::new(QueueManager::new(
        store,
        Arc::new(UuidProvider),
        Arc::new(SystemTimeProvider),
    ));

    let monitor_interval = env_secs("RENDERQ_MONITOR_INTERVAL_SECS", DEFAULT_MONITOR_INTERVAL_SECS);
    let stale_after = env_secs("RENDERQ_STALE_AFTER_SECS", DEFAULT_STALE_AFTER_SECS);
    queue_manager.start_monitor(monitor_interval, stale_after);

    // 4. Start JSON-RPC server
    let mut rpc_config = RpcServerConfig::default();
    if let Ok(host) = std::env::var("RENDERQ_RPC_HOST") {
        rpc_config.host = host;
    }
    if let Some(port) = std::env::var("RENDERQ_RPC_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
    {
        rpc_config.port = port;
    }

    let rpc_server = RpcServer::new(rpc_config, queue_manager.clone());
    let (addr, rpc_handle) = rpc_server
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    info!(addr = %addr, "System ready. Waiting for workers...");
    info!("Press Ctrl+C to shutdown");

    // 5. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 6. Graceful shutdown: stop taking requests, then stop the monitor
    rpc_handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;
    queue_manager.stop_monitor().await;

    info!("Shutdown complete.");

    Ok(())
}

fn env_secs(var: &str, default_secs: u64) -> Duration {
    Duration::from_secs(
        std::env::var(var)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default_secs),
    )
}
