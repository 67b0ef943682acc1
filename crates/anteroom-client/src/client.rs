// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! AnteroomClient for interacting with the coordinator over HTTP.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::types::{BeginOptions, BeginOutcome, SignalReceipt, WorkHandle, WorkInfo, WorkState};

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

fn error_from_body(status: StatusCode, body: &[u8]) -> ClientError {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(parsed) => ClientError::Server {
            code: parsed.error.code,
            message: parsed.error.message,
        },
        Err(_) => ClientError::UnexpectedResponse(format!(
            "{} with body {}",
            status,
            String::from_utf8_lossy(body)
        )),
    }
}

/// High-level client for the anteroom coordinator.
///
/// Wraps the three coordinator operations - begin, complete, status - and
/// adds a client-side wait for callers that received a polling handle.
pub struct AnteroomClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl AnteroomClient {
    /// Create a new client with the given configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build http client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Create a client from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Create a client with local development defaults.
    pub fn localhost() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    // =========================================================================
    // Coordinator operations
    // =========================================================================

    /// Begin a unit of work and block until it finishes or the coordinator's
    /// wait deadline elapses.
    ///
    /// A work failure within the deadline is reported as
    /// [`BeginOutcome::Failed`], not an error: the coordinator did its job,
    /// the work itself did not.
    #[instrument(skip(self, options), fields(correlation_key = %options.correlation_key))]
    pub async fn begin(&self, options: BeginOptions) -> Result<BeginOutcome> {
        debug!("Beginning unit of work");

        let response = self
            .client
            .post(self.url("/api/v1/work"))
            .json(&options)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let result: serde_json::Value = response.json().await?;
                Ok(BeginOutcome::Completed(result))
            }
            StatusCode::ACCEPTED => {
                let handle: WorkHandle = response.json().await?;
                Ok(BeginOutcome::Accepted(handle))
            }
            status => {
                let body = response.bytes().await.unwrap_or_default();
                // A 500 carries either the work-failure envelope or a
                // coordinator error body; the envelope has a status field
                if let Ok(info) = serde_json::from_slice::<WorkInfo>(&body) {
                    if info.status == WorkState::Error {
                        return Ok(BeginOutcome::Failed(info));
                    }
                }
                Err(error_from_body(status, &body))
            }
        }
    }

    /// Signal successful completion of a unit of work.
    #[instrument(skip(self, payload), fields(correlation_key = %correlation_key))]
    pub async fn complete(
        &self,
        correlation_key: &str,
        payload: serde_json::Value,
    ) -> Result<SignalReceipt> {
        self.signal(correlation_key, "success", payload).await
    }

    /// Signal failure of a unit of work.
    #[instrument(skip(self, payload), fields(correlation_key = %correlation_key))]
    pub async fn fail(
        &self,
        correlation_key: &str,
        payload: serde_json::Value,
    ) -> Result<SignalReceipt> {
        self.signal(correlation_key, "failure", payload).await
    }

    async fn signal(
        &self,
        correlation_key: &str,
        outcome: &str,
        payload: serde_json::Value,
    ) -> Result<SignalReceipt> {
        debug!(outcome = outcome, "Sending completion signal");

        let body = serde_json::json!({
            "correlation_key": correlation_key,
            "outcome": outcome,
            "payload": payload,
        });
        let response = self
            .client
            .post(self.url("/api/v1/work/complete"))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.bytes().await.unwrap_or_default();
            return Err(error_from_body(status, &body));
        }

        Ok(response.json().await?)
    }

    /// Read the current status of a unit of work.
    #[instrument(skip(self), fields(correlation_key = %correlation_key))]
    pub async fn status(&self, correlation_key: &str) -> Result<WorkInfo> {
        let url = self.url(&format!(
            "/api/v1/work/{}",
            urlencoding::encode(correlation_key)
        ));
        let response = self.client.get(url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::RecordNotFound(correlation_key.to_string()));
        }

        // 200, 202 and 500 all carry the status envelope; anything else is
        // a coordinator error body
        let status = response.status();
        let body = response.bytes().await?;
        match serde_json::from_slice::<WorkInfo>(&body) {
            Ok(info) => Ok(info),
            Err(_) => Err(error_from_body(status, &body)),
        }
    }

    /// List all work records the coordinator currently holds.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<WorkInfo>> {
        let response = self.client.get(self.url("/api/v1/work")).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.bytes().await.unwrap_or_default();
            return Err(error_from_body(status, &body));
        }

        Ok(response.json().await?)
    }

    /// Check whether the coordinator is healthy.
    pub async fn health_check(&self) -> Result<bool> {
        let response = self.client.get(self.url("/health")).send().await?;
        Ok(response.status() == StatusCode::OK)
    }

    // =========================================================================
    // Convenience methods
    // =========================================================================

    /// Poll until the unit of work reaches a terminal state.
    ///
    /// Polls with geometric backoff between the configured floor and cap.
    /// Returns [`ClientError::DeadlineElapsed`] if the work is still pending
    /// when the deadline runs out.
    #[instrument(skip(self), fields(correlation_key = %correlation_key))]
    pub async fn wait_until_terminal(
        &self,
        correlation_key: &str,
        deadline: Duration,
    ) -> Result<WorkInfo> {
        let give_up = tokio::time::Instant::now() + deadline;
        let mut delay = self.config.poll_floor;

        loop {
            let info = self.status(correlation_key).await?;
            if info.status.is_terminal() {
                return Ok(info);
            }

            let now = tokio::time::Instant::now();
            if now >= give_up {
                return Err(ClientError::DeadlineElapsed(correlation_key.to_string()));
            }

            tokio::time::sleep(delay.min(give_up - now)).await;
            delay = delay.saturating_mul(2).min(self.config.poll_cap);
        }
    }

    /// Begin a unit of work and wait for its result, polling past the
    /// coordinator's wait deadline if needed.
    ///
    /// `deadline` bounds the client-side polling phase only. A work failure
    /// is returned as [`ClientError::WorkFailed`].
    pub async fn run(
        &self,
        options: BeginOptions,
        deadline: Duration,
    ) -> Result<serde_json::Value> {
        match self.begin(options).await? {
            BeginOutcome::Completed(result) => Ok(result),
            BeginOutcome::Failed(info) => Err(ClientError::WorkFailed {
                correlation_key: info.correlation_key,
                error: info.error.unwrap_or(serde_json::Value::Null),
            }),
            BeginOutcome::Accepted(handle) => {
                let info = self
                    .wait_until_terminal(&handle.correlation_key, deadline)
                    .await?;
                match info.status {
                    WorkState::Error => Err(ClientError::WorkFailed {
                        correlation_key: info.correlation_key,
                        error: info.error.unwrap_or(serde_json::Value::Null),
                    }),
                    _ => Ok(info.result.unwrap_or(serde_json::Value::Null)),
                }
            }
        }
    }
}
