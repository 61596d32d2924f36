//! Dashboard Gateway - Main Application Entry Point
//!
//! This is the request gateway of a hosted dashboard product's public data
//! API. It authenticates callers by long-lived API keys (stored only as
//! SHA-256 hashes), resolves their subscription tier, and enforces
//! per-tier rate ceilings with atomic counters in a shared store, so that
//! any number of gateway instances enforce one consistent budget.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (credentials, accounts, counters)
//! - **Authentication**: bearer API key with SHA-256 hashing
//! - **Rate Limiting**: fixed 60 s windows, one atomic upsert per request
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Spawn the rate-limit window sweep task
//! 5. Build HTTP router with the gate on every data route
//! 6. Start server on configured port

mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod services;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::FromRef,
    middleware as axum_middleware,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::db::DbPool;
use crate::services::rate_limit::{PgCounterStore, RateLimiter};

/// Shared application state: the database pool plus the rate limiter
/// (which itself holds only a handle to the shared counter store).
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub limiter: RateLimiter,
}

impl FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG
    // environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load configuration
    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded");

    // Create database pool
    let pool = db::create_pool(&config.database_url, config.max_db_connections).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let limiter = RateLimiter::new(Arc::new(PgCounterStore::new(pool.clone())));
    let state = AppState { pool, limiter };

    // Postgres has no key TTL, so expired windows are swept periodically.
    // The check never reads past windows; this is housekeeping only.
    let sweep_limiter = state.limiter.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(120));
        loop {
            ticker.tick().await;
            match sweep_limiter.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!("purged {removed} expired rate-limit windows"),
                Err(e) => tracing::warn!("rate-limit window sweep failed: {e}"),
            }
        }
    });

    // Data API routes: every request passes the gate (anonymous allowed,
    // rate-limited by IP).
    let data_routes = Router::new()
        .route("/api/v1/scores", get(handlers::scores::list_scores))
        .route(
            "/api/v1/reports/summary",
            get(handlers::scores::report_summary),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::gate::gate_middleware,
        ));

    // Key management routes: gate first, then a verified identity is
    // mandatory. Layers added later run first, so the gate goes last.
    let key_routes = Router::new()
        .route("/api/v1/keys", post(handlers::api_keys::create_key))
        .route("/api/v1/keys", get(handlers::api_keys::list_keys))
        .route("/api/v1/keys/{id}", delete(handlers::api_keys::revoke_key))
        .route_layer(axum_middleware::from_fn(middleware::gate::require_identity))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::gate::gate_middleware,
        ));

    let app = Router::new()
        // Public routes (no authentication, no rate budget)
        .route("/health", get(handlers::health::health_check))
        // Merge gated routes
        .merge(data_routes)
        .merge(key_routes)
        // Add distributed tracing middleware for observability
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Bind to network address and start server
    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Gateway listening on {}", addr);

    // Start serving HTTP requests
    axum::serve(listener, app).await?;

    Ok(())
}
