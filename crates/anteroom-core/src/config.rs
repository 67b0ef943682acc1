// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use crate::wait::WaitSettings;

/// Anteroom service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// HTTP listen address
    pub bind_addr: SocketAddr,
    /// Endpoint the engine trigger POSTs to
    pub engine_url: String,
    /// Timeout for the outbound engine trigger call
    pub engine_timeout: Duration,
    /// Wait Engine tunables (deadline, poll floor/cap, per-read timeout)
    pub wait: WaitSettings,
    /// Delay between a terminal transition and the fast-path delete
    pub cleanup_grace: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `ANTEROOM_DATABASE_URL`: PostgreSQL connection string
    /// - `ANTEROOM_ENGINE_URL`: endpoint that starts the external work
    ///
    /// Optional (with defaults):
    /// - `ANTEROOM_BIND_ADDR`: HTTP listen address (default: 0.0.0.0:8080)
    /// - `ANTEROOM_ENGINE_TIMEOUT_MS`: trigger call timeout (default: 10000)
    /// - `ANTEROOM_WAIT_TIMEOUT_MS`: wait deadline (default: 25000)
    /// - `ANTEROOM_POLL_FLOOR_MS`: first poll interval (default: 50)
    /// - `ANTEROOM_POLL_CAP_MS`: maximum poll interval (default: 1000)
    /// - `ANTEROOM_READ_TIMEOUT_MS`: per-read store timeout (default: 250)
    /// - `ANTEROOM_CLEANUP_GRACE_MS`: delete delay after completion (default: 5000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("ANTEROOM_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("ANTEROOM_DATABASE_URL"))?;

        let engine_url = std::env::var("ANTEROOM_ENGINE_URL")
            .map_err(|_| ConfigError::Missing("ANTEROOM_ENGINE_URL"))?;

        let bind_addr: SocketAddr = std::env::var("ANTEROOM_BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("ANTEROOM_BIND_ADDR", "must be a valid socket address")
            })?;

        let engine_timeout = duration_ms_var("ANTEROOM_ENGINE_TIMEOUT_MS", 10_000)?;

        let wait = WaitSettings {
            wait_timeout: duration_ms_var("ANTEROOM_WAIT_TIMEOUT_MS", 25_000)?,
            poll_floor: duration_ms_var("ANTEROOM_POLL_FLOOR_MS", 50)?,
            poll_cap: duration_ms_var("ANTEROOM_POLL_CAP_MS", 1_000)?,
            read_timeout: duration_ms_var("ANTEROOM_READ_TIMEOUT_MS", 250)?,
        };

        let cleanup_grace = duration_ms_var("ANTEROOM_CLEANUP_GRACE_MS", 5_000)?;

        Ok(Self {
            database_url,
            bind_addr,
            engine_url,
            engine_timeout,
            wait,
            cleanup_grace,
        })
    }
}

/// Read a millisecond duration from an environment variable, falling back
/// to the given default when the variable is unset.
fn duration_ms_var(name: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    let ms: u64 = std::env::var(name)
        .unwrap_or_else(|_| default_ms.to_string())
        .parse()
        .map_err(|_| ConfigError::Invalid(name, "must be a non-negative integer (milliseconds)"))?;
    Ok(Duration::from_millis(ms))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
