// Postgres Connection Pool Setup

use std::str::FromStr;
use std::time::Duration;

use renderq_core::error::AppError;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

/// Per-statement timeout. A claim that outlives this is treated by the
/// caller as "no job claimed", never as success.
const STATEMENT_TIMEOUT_MS: u64 = 10_000;

/// Create a Postgres connection pool with short timeouts
pub async fn create_pool(database_url: &str) -> Result<PgPool, AppError> {
    let options = PgConnectOptions::from_str(database_url)
        .map_err(|e| AppError::Configuration(format!("invalid database url: {}", e)))?
        .options([("statement_timeout", STATEMENT_TIMEOUT_MS.to_string().as_str())]);

    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
        .map_err(|e| AppError::Storage(format!("pool creation failed: {}", e)))
}
