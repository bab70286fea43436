// Renderq Infrastructure - Postgres Adapter
// Implements: JobStore with atomic conditional updates, safe for a fleet
// of independent worker hosts and multiple API-server replicas

mod connection;
mod migration;
mod store;

pub use connection::create_pool;
pub use migration::run_migrations;
pub use store::PgJobStore;

// Note: sqlx::Error conversion is handled by a local helper due to
// Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
