//! Database connection pool and migration management.
//!
//! All shared mutable state (accounts, API key records, rate-limit
//! windows) lives in PostgreSQL so every gateway instance observes the
//! same credentials and counters.

use sqlx::{Pool, Postgres};

/// Type alias for PostgreSQL connection pool.
pub type DbPool = Pool<Postgres>;

/// Create a new PostgreSQL connection pool.
///
/// # Arguments
///
/// * `database_url` - PostgreSQL connection string
/// * `max_connections` - upper bound on concurrent connections
///
/// # Errors
///
/// Returns an error if the connection string is invalid, the server is
/// unreachable, or authentication fails.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Run database migrations from the `migrations/` directory.
///
/// Migrations are tracked in the `_sqlx_migrations` table, so each file
/// runs only once per database.
///
/// # Errors
///
/// Returns an error if a migration file cannot be read or fails to
/// execute.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    // The macro reads migrations at compile time from ./migrations
    sqlx::migrate!("./migrations").run(pool).await
}
