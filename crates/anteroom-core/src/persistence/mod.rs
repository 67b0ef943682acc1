// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and backends for anteroom-core.
//!
//! This module defines the state store abstraction and backend implementations.

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresPersistence;
pub use self::sqlite::SqlitePersistence;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CoordinatorError;

/// Lifecycle status of a work record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkStatus {
    /// Work has been recorded and the engine has not reported back.
    Pending,
    /// Work finished successfully; `result_payload` is set.
    Done,
    /// Work failed; `error_payload` is set.
    Error,
}

impl WorkStatus {
    /// Stored string form of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    /// Parse a stored status string. Unknown strings yield `None` and are
    /// treated as non-terminal by callers.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "done" => Some(Self::Done),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Whether the status is done or error. Terminal records never change
    /// status again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

impl fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Work record from the state store.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WorkRecord {
    /// Caller-chosen key identifying one unit of work across its lifecycle.
    pub correlation_key: String,
    /// Current status (pending, done, error).
    pub status: String,
    /// Result data, set only when status is done.
    pub result_payload: Option<Vec<u8>>,
    /// Error data, set only when status is error.
    pub error_payload: Option<String>,
    /// When the record was created.
    pub started_at: DateTime<Utc>,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

/// Audit event from the append-only mirror.
///
/// Events have no foreign key to work records: the audit trail survives
/// fast-path cleanup.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WorkEventRecord {
    /// Database primary key.
    pub id: i64,
    /// Correlation key the event belongs to.
    pub correlation_key: String,
    /// Type of event (work_started, work_completed, work_failed, record_deleted).
    pub event_type: String,
    /// Optional free-form detail.
    pub detail: Option<String>,
    /// When the event was recorded.
    pub created_at: DateTime<Utc>,
}

/// Result of a terminal-transition write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalApplied {
    /// Whether a row existed before the write. Informational only: a signal
    /// may legitimately arrive before the creator's upsert.
    pub record_existed: bool,
    /// Whether this call performed the terminal write. False when the row
    /// was already terminal; the first terminal payload is retained.
    pub transitioned: bool,
}

/// State store interface used by the coordinator.
///
/// All coordination between waiters and signalers goes through these
/// operations; no in-process memory is shared between them.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Create a pending record, or refresh `updated_at` if one already
    /// exists in pending. A terminal record is left untouched: status never
    /// moves backward, and concurrent calls for the same key from different
    /// processes surface no duplicate-key error.
    async fn upsert_pending(&self, correlation_key: &str) -> Result<(), CoordinatorError>;

    /// Transition the record to done with the given result payload.
    ///
    /// Performed as a single conditional upsert: an absent row is created
    /// already terminal (the signal may race ahead of the creator), a
    /// pending row transitions, and an already-terminal row is a no-op that
    /// still reports success.
    async fn complete_record(
        &self,
        correlation_key: &str,
        result: &[u8],
    ) -> Result<SignalApplied, CoordinatorError>;

    /// Transition the record to error with the given error payload.
    /// Semantics mirror [`complete_record`](Persistence::complete_record).
    async fn fail_record(
        &self,
        correlation_key: &str,
        error: &str,
    ) -> Result<SignalApplied, CoordinatorError>;

    /// Point read of a single record. Plain read, no locking clause; the
    /// wait loop bounds each call with its own timeout.
    async fn read_record(
        &self,
        correlation_key: &str,
    ) -> Result<Option<WorkRecord>, CoordinatorError>;

    /// Full scan, newest first. Operational visibility, not the hot path.
    async fn list_records(&self) -> Result<Vec<WorkRecord>, CoordinatorError>;

    /// Physically remove a record. Returns whether a row was deleted.
    /// Called only by the cleanup policy.
    async fn delete_record(&self, correlation_key: &str) -> Result<bool, CoordinatorError>;

    /// Keys of terminal records last written before `older_than`, oldest
    /// first, for batched sweeping.
    async fn terminal_records_older_than(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<String>, CoordinatorError>;

    /// Keys of pending records last written before `older_than`, oldest
    /// first. Catches rows abandoned by trigger failures or a lost engine.
    async fn pending_records_older_than(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<String>, CoordinatorError>;

    /// Delete records by key. Returns the count of deleted rows.
    async fn delete_records_batch(
        &self,
        correlation_keys: &[String],
    ) -> Result<u64, CoordinatorError>;

    /// Append an audit event. Callers treat failures as advisory.
    async fn record_event(
        &self,
        correlation_key: &str,
        event_type: &str,
        detail: Option<&str>,
    ) -> Result<(), CoordinatorError>;

    /// Audit events for a key, newest first.
    async fn list_events(
        &self,
        correlation_key: &str,
        limit: i64,
    ) -> Result<Vec<WorkEventRecord>, CoordinatorError>;

    /// Cheap liveness probe of the backing store.
    async fn health_check(&self) -> Result<(), CoordinatorError>;
}
