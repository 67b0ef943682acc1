// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Outbound trigger to the external workflow engine.
//!
//! Recording a unit of work and executing it are separate concerns: the
//! coordinator owns the record, the engine owns the execution. The trigger
//! is the coordinator's only outbound call; the engine reports back later
//! through the completion endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::error::{CoordinatorError, Result};

/// Payload handed to the engine when work is started.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerRequest {
    /// Key the engine must echo back in its completion signal.
    pub correlation_key: String,
    /// Which workflow to run.
    pub work_descriptor: String,
    /// Opaque inputs, forwarded untouched.
    pub inputs: serde_json::Value,
}

/// Seam to the external workflow engine.
#[async_trait]
pub trait EngineTrigger: Send + Sync {
    /// Ask the engine to start the described work.
    ///
    /// Success means the engine accepted the request, not that the work
    /// ran. Duplicate triggers for the same key may occur when a caller
    /// retries a begin; deduplication is the engine's concern.
    async fn trigger(&self, request: &TriggerRequest) -> Result<()>;
}

/// Trigger that posts JSON to a fixed engine endpoint.
pub struct HttpEngineTrigger {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpEngineTrigger {
    /// Build a trigger client for `endpoint` with a per-request timeout.
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoordinatorError::TriggerFailed {
                reason: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl EngineTrigger for HttpEngineTrigger {
    async fn trigger(&self, request: &TriggerRequest) -> Result<()> {
        debug!(
            correlation_key = %request.correlation_key,
            work_descriptor = %request.work_descriptor,
            "Triggering engine"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CoordinatorError::TriggerFailed {
                reason: format!("engine returned {}: {}", status, body),
            });
        }

        Ok(())
    }
}
