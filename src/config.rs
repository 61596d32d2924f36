//! Application configuration management.
//!
//! Configuration is loaded from environment variables via the `envy`
//! crate, with an optional `.env` file for local development.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `MAX_DB_CONNECTIONS` (optional): connection pool cap, defaults to 5
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_max_db_connections")]
    pub max_db_connections: u32,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

/// Default pool size if MAX_DB_CONNECTIONS is not set.
fn default_max_db_connections() -> u32 {
    5
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Loads a `.env` file first if one exists, then deserializes the
    /// environment into a `Config`.
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABASE_URL` is missing or any value cannot
    /// be parsed into its expected type.
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        envy::from_env::<Config>()
    }
}
