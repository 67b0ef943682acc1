// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! High-level types for the anteroom client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkState {
    /// Work is recorded but has not finished.
    Pending,
    /// Work finished successfully.
    Done,
    /// Work failed.
    Error,
}

impl WorkState {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkState::Done | WorkState::Error)
    }
}

/// Snapshot of one work record, as returned by the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkInfo {
    /// Key identifying the unit of work.
    pub correlation_key: String,
    /// Current lifecycle state.
    pub status: WorkState,
    /// Result payload, present when done.
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Failure payload, present when failed.
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    /// When the record was created.
    pub started_at: DateTime<Utc>,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

/// Durable handle returned when a begin request outlives its wait deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkHandle {
    /// Key to poll.
    pub correlation_key: String,
    /// Status endpoint path for that key.
    pub status_url: String,
}

/// Acknowledgment returned for every completion signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalReceipt {
    /// Key the signal addressed.
    pub correlation_key: String,
    /// Whether the terminal write reached the store.
    pub recorded: bool,
    /// Whether a record existed before the write.
    pub record_existed: bool,
}

/// Options for beginning a unit of work.
#[derive(Debug, Clone, Serialize)]
pub struct BeginOptions {
    /// Caller-chosen key identifying this unit of work.
    pub correlation_key: String,
    /// Which workflow the engine should run.
    pub work_descriptor: String,
    /// Inputs forwarded to the engine.
    pub inputs: serde_json::Value,
}

impl BeginOptions {
    /// Create begin options with empty inputs.
    pub fn new(correlation_key: impl Into<String>, work_descriptor: impl Into<String>) -> Self {
        Self {
            correlation_key: correlation_key.into(),
            work_descriptor: work_descriptor.into(),
            inputs: serde_json::Value::Null,
        }
    }

    /// Set the inputs forwarded to the engine.
    pub fn with_inputs(mut self, inputs: serde_json::Value) -> Self {
        self.inputs = inputs;
        self
    }
}

/// Outcome of a begin call.
#[derive(Debug, Clone)]
pub enum BeginOutcome {
    /// The work finished within the wait deadline; this is its result.
    Completed(serde_json::Value),
    /// The work failed within the wait deadline.
    Failed(WorkInfo),
    /// The wait deadline elapsed; poll the handle for the outcome.
    Accepted(WorkHandle),
}
