// Migration Runner

use renderq_core::error::AppError;
use sqlx::PgPool;
use tracing::info;

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), AppError> {
    info!("Running database migrations...");

    sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version BIGINT PRIMARY KEY)")
        .execute(pool)
        .await
        .map_err(migration_error)?;

    let current_version: i64 =
        sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
            .fetch_one(pool)
            .await
            .map_err(migration_error)?;

    info!(version = current_version, "Current schema version");

    if current_version < 1 {
        info!("Applying migration 001: Initial schema");
        apply_migration(pool, 1, include_str!("../migrations/001_initial_schema.sql")).await?;
    }

    info!("All migrations applied");
    Ok(())
}

/// Apply a single migration file inside one transaction, then record
/// its version
async fn apply_migration(pool: &PgPool, version: i64, sql: &str) -> Result<(), AppError> {
    let mut tx = pool.begin().await.map_err(migration_error)?;

    for statement in sql.split(';') {
        let clean: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();
        if !clean.is_empty() {
            sqlx::query(&clean)
                .execute(&mut *tx)
                .await
                .map_err(migration_error)?;
        }
    }

    sqlx::query("INSERT INTO schema_version (version) VALUES ($1)")
        .bind(version)
        .execute(&mut *tx)
        .await
        .map_err(migration_error)?;

    tx.commit().await.map_err(migration_error)
}

fn migration_error(err: sqlx::Error) -> AppError {
    AppError::Storage(format!("migration failed: {}", err))
}
