// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the anteroom client.

use std::time::Duration;

use crate::error::{ClientError, Result};

/// Configuration for the AnteroomClient.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the coordinator.
    pub base_url: String,
    /// Per-request timeout. Begin calls block server-side for up to the
    /// coordinator's wait deadline, so this must be longer than that.
    pub request_timeout: Duration,
    /// First poll interval used by client-side waits.
    pub poll_floor: Duration,
    /// Maximum poll interval used by client-side waits.
    pub poll_cap: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            request_timeout: Duration::from_secs(30),
            poll_floor: Duration::from_millis(50),
            poll_cap: Duration::from_millis(1_000),
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration from environment variables.
    ///
    /// Environment variables:
    /// - `ANTEROOM_URL`: Coordinator base URL (default: "http://127.0.0.1:8080")
    /// - `ANTEROOM_CLIENT_TIMEOUT_MS`: Per-request timeout in milliseconds (default: 30000)
    /// - `ANTEROOM_CLIENT_POLL_FLOOR_MS`: First poll interval in milliseconds (default: 50)
    /// - `ANTEROOM_CLIENT_POLL_CAP_MS`: Maximum poll interval in milliseconds (default: 1000)
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("ANTEROOM_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());

        let request_timeout_ms: u64 = std::env::var("ANTEROOM_CLIENT_TIMEOUT_MS")
            .unwrap_or_else(|_| "30000".to_string())
            .parse()
            .map_err(|e| {
                ClientError::Config(format!("invalid ANTEROOM_CLIENT_TIMEOUT_MS: {}", e))
            })?;

        let poll_floor_ms: u64 = std::env::var("ANTEROOM_CLIENT_POLL_FLOOR_MS")
            .unwrap_or_else(|_| "50".to_string())
            .parse()
            .map_err(|e| {
                ClientError::Config(format!("invalid ANTEROOM_CLIENT_POLL_FLOOR_MS: {}", e))
            })?;

        let poll_cap_ms: u64 = std::env::var("ANTEROOM_CLIENT_POLL_CAP_MS")
            .unwrap_or_else(|_| "1000".to_string())
            .parse()
            .map_err(|e| {
                ClientError::Config(format!("invalid ANTEROOM_CLIENT_POLL_CAP_MS: {}", e))
            })?;

        Ok(Self {
            base_url,
            request_timeout: Duration::from_millis(request_timeout_ms),
            poll_floor: Duration::from_millis(poll_floor_ms),
            poll_cap: Duration::from_millis(poll_cap_ms),
        })
    }

    /// Set the coordinator base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the first poll interval for client-side waits.
    pub fn with_poll_floor(mut self, floor: Duration) -> Self {
        self.poll_floor = floor;
        self
    }

    /// Set the maximum poll interval for client-side waits.
    pub fn with_poll_cap(mut self, cap: Duration) -> Self {
        self.poll_cap = cap;
        self
    }
}
