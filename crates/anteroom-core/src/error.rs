// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for anteroom-core.
//!
//! Provides a unified error type that maps to HTTP error responses.

use std::fmt;

/// Result type using CoordinatorError
pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// Coordinator errors that can occur during request processing.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CoordinatorError {
    /// No work record exists for the correlation key.
    RecordNotFound {
        /// The correlation key that was not found.
        correlation_key: String,
    },

    /// Input validation failed.
    ValidationError {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// Database operation failed.
    DatabaseError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },

    /// The call that starts the external engine failed.
    TriggerFailed {
        /// The reason for failure.
        reason: String,
    },

    /// Payload could not be serialized or deserialized.
    SerializationError {
        /// Error details.
        details: String,
    },
}

impl CoordinatorError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::RecordNotFound { .. } => "RECORD_NOT_FOUND",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::DatabaseError { .. } => "DATABASE_ERROR",
            Self::TriggerFailed { .. } => "TRIGGER_FAILED",
            Self::SerializationError { .. } => "SERIALIZATION_ERROR",
        }
    }
}

impl fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RecordNotFound { correlation_key } => {
                write!(f, "No work record for correlation key '{}'", correlation_key)
            }
            Self::ValidationError { field, message } => {
                write!(f, "Validation error for '{}': {}", field, message)
            }
            Self::DatabaseError { operation, details } => {
                write!(f, "Database error during '{}': {}", operation, details)
            }
            Self::TriggerFailed { reason } => {
                write!(f, "Engine trigger failed: {}", reason)
            }
            Self::SerializationError { details } => {
                write!(f, "Payload serialization failed: {}", details)
            }
        }
    }
}

impl std::error::Error for CoordinatorError {}

impl From<sqlx::Error> for CoordinatorError {
    fn from(err: sqlx::Error) -> Self {
        CoordinatorError::DatabaseError {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoordinatorError {
    fn from(err: serde_json::Error) -> Self {
        CoordinatorError::SerializationError {
            details: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for CoordinatorError {
    fn from(err: reqwest::Error) -> Self {
        CoordinatorError::TriggerFailed {
            reason: err.to_string(),
        }
    }
}
