// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Anteroom Core - Correlation Completion Coordinator
//!
//! The coordinator is responsible for:
//! - Work records (pending/terminal state under correlation keys)
//! - Completion signals (idempotent terminal transitions)
//! - Work events (audit log)
//!
//! Note: executing the work itself is the external workflow engine's
//! job; the coordinator triggers it and waits for its signal.

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

use anteroom_core::cleanup::{CleanupWorker, CleanupWorkerConfig};
use anteroom_core::config::Config;
use anteroom_core::engine::HttpEngineTrigger;
use anteroom_core::handlers::HandlerState;
use anteroom_core::http::build_router;
use anteroom_core::migrations;
use anteroom_core::persistence::PostgresPersistence;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("anteroom_core=info".parse().unwrap()),
        )
        .init();

    info!("Starting Anteroom Core");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        bind_addr = %config.bind_addr,
        engine_url = %config.engine_url,
        wait_timeout_ms = config.wait.wait_timeout.as_millis() as u64,
        "Configuration loaded"
    );

    // Connect to database
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    info!("Database connection established");

    // Verify connection
    let row: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&pool).await?;
    info!(result = row.0, "Database health check passed");

    // Create persistence backend and shared handler state
    let persistence = Arc::new(PostgresPersistence::new(pool.clone()));
    let engine = Arc::new(HttpEngineTrigger::new(
        config.engine_url.clone(),
        config.engine_timeout,
    )?);
    let state = Arc::new(HandlerState::new(
        persistence.clone(),
        engine,
        config.wait.clone(),
        config.cleanup_grace,
    ));

    info!("Running database migrations...");
    migrations::run_postgres(&pool).await?;
    info!("Migrations completed");

    info!("Anteroom Core initialized successfully");

    // Start the cleanup worker (sweeps terminal records whose grace delete
    // never ran, and pending records whose signal never arrived)
    let cleanup_worker = CleanupWorker::new(persistence.clone(), CleanupWorkerConfig::from_env());
    let cleanup_shutdown = cleanup_worker.shutdown_handle();
    let cleanup_handle = tokio::spawn(async move { cleanup_worker.run().await });

    // Start HTTP server (callers and the engine both connect here)
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "HTTP server listening");
    let router = build_router(state);
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("HTTP server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    // Stop background tasks
    cleanup_shutdown.notify_one();
    let _ = cleanup_handle.await;
    server_handle.abort();

    pool.close().await;
    info!("Shutdown complete");

    Ok(())
}
