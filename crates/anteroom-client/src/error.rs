// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for anteroom-client.

use thiserror::Error;

/// Result type using ClientError.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when using the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration error (missing or invalid values).
    #[error("configuration error: {0}")]
    Config(String),

    /// The HTTP request could not be completed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The coordinator returned an error response.
    #[error("server error [{code}]: {message}")]
    Server {
        /// Coordinator error code.
        code: String,
        /// Human-readable message.
        message: String,
    },

    /// No work record exists for the correlation key.
    #[error("no work record for correlation key '{0}'")]
    RecordNotFound(String),

    /// The unit of work itself failed.
    #[error("work '{correlation_key}' failed")]
    WorkFailed {
        /// Key of the failed unit of work.
        correlation_key: String,
        /// Failure payload reported by the engine.
        error: serde_json::Value,
    },

    /// A client-side wait gave up before the work reached a terminal state.
    #[error("wait deadline elapsed for correlation key '{0}'")]
    DeadlineElapsed(String),

    /// Response did not match any shape the coordinator emits.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Serialization(err.to_string())
    }
}
