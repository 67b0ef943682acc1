// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed state store implementation.
//!
//! Used for embedded deployments and tests; the production backend is
//! PostgreSQL. Semantics match `postgres.rs` operation for operation.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use crate::error::CoordinatorError;
use crate::migrations;

use super::{Persistence, SignalApplied, WorkEventRecord, WorkRecord, WorkStatus};

/// SQLite-backed state store.
#[derive(Clone)]
pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    /// Create a new SQLite state store from an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a file-backed store, creating the database file and any parent
    /// directories on first use, then run migrations.
    ///
    /// Embedded deployments call this; the server binary connects to
    /// PostgreSQL instead. The database is opened in WAL mode with a busy
    /// timeout of five seconds.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, CoordinatorError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CoordinatorError::DatabaseError {
                operation: "create_dir".to_string(),
                details: format!("cannot create {}: {}", parent.display(), e),
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| CoordinatorError::DatabaseError {
                operation: "connect".to_string(),
                details: format!("cannot open {}: {}", path.display(), e),
            })?;

        migrations::run_sqlite(&pool)
            .await
            .map_err(|e| CoordinatorError::DatabaseError {
                operation: "migrate".to_string(),
                details: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    /// Terminal write shared by complete and fail: insert-if-absent already
    /// terminal, transition if pending, no-op if already terminal.
    async fn terminal_upsert(
        &self,
        correlation_key: &str,
        status: WorkStatus,
        result: Option<&[u8]>,
        error: Option<&str>,
    ) -> Result<SignalApplied, CoordinatorError> {
        let (record_existed,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS(SELECT 1 FROM work_records WHERE correlation_key = ?)
            "#,
        )
        .bind(correlation_key)
        .fetch_one(&self.pool)
        .await?;

        let outcome = sqlx::query(
            r#"
            INSERT INTO work_records (correlation_key, status, result_payload, error_payload, started_at, updated_at)
            VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
            ON CONFLICT (correlation_key) DO UPDATE
            SET status = excluded.status,
                result_payload = excluded.result_payload,
                error_payload = excluded.error_payload,
                updated_at = CURRENT_TIMESTAMP
            WHERE work_records.status = 'pending'
            "#,
        )
        .bind(correlation_key)
        .bind(status.as_str())
        .bind(result)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(SignalApplied {
            record_existed,
            transitioned: outcome.rows_affected() > 0,
        })
    }
}

#[async_trait::async_trait]
impl Persistence for SqlitePersistence {
    async fn upsert_pending(&self, correlation_key: &str) -> Result<(), CoordinatorError> {
        sqlx::query(
            r#"
            INSERT INTO work_records (correlation_key, status, started_at, updated_at)
            VALUES (?, 'pending', CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
            ON CONFLICT (correlation_key) DO UPDATE
            SET updated_at = CURRENT_TIMESTAMP
            WHERE work_records.status = 'pending'
            "#,
        )
        .bind(correlation_key)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn complete_record(
        &self,
        correlation_key: &str,
        result: &[u8],
    ) -> Result<SignalApplied, CoordinatorError> {
        self.terminal_upsert(correlation_key, WorkStatus::Done, Some(result), None)
            .await
    }

    async fn fail_record(
        &self,
        correlation_key: &str,
        error: &str,
    ) -> Result<SignalApplied, CoordinatorError> {
        self.terminal_upsert(correlation_key, WorkStatus::Error, None, Some(error))
            .await
    }

    async fn read_record(
        &self,
        correlation_key: &str,
    ) -> Result<Option<WorkRecord>, CoordinatorError> {
        let record = sqlx::query_as::<_, WorkRecord>(
            r#"
            SELECT correlation_key, status, result_payload, error_payload,
                   started_at, updated_at
            FROM work_records
            WHERE correlation_key = ?
            "#,
        )
        .bind(correlation_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_records(&self) -> Result<Vec<WorkRecord>, CoordinatorError> {
        let records = sqlx::query_as::<_, WorkRecord>(
            r#"
            SELECT correlation_key, status, result_payload, error_payload,
                   started_at, updated_at
            FROM work_records
            ORDER BY started_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn delete_record(&self, correlation_key: &str) -> Result<bool, CoordinatorError> {
        let outcome = sqlx::query(
            r#"
            DELETE FROM work_records WHERE correlation_key = ?
            "#,
        )
        .bind(correlation_key)
        .execute(&self.pool)
        .await?;

        Ok(outcome.rows_affected() > 0)
    }

    async fn terminal_records_older_than(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<String>, CoordinatorError> {
        let keys = sqlx::query_scalar::<_, String>(
            r#"
            SELECT correlation_key
            FROM work_records
            WHERE status IN ('done', 'error') AND updated_at < ?
            ORDER BY updated_at ASC
            LIMIT ?
            "#,
        )
        .bind(older_than)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    async fn pending_records_older_than(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<String>, CoordinatorError> {
        let keys = sqlx::query_scalar::<_, String>(
            r#"
            SELECT correlation_key
            FROM work_records
            WHERE status = 'pending' AND updated_at < ?
            ORDER BY updated_at ASC
            LIMIT ?
            "#,
        )
        .bind(older_than)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    async fn delete_records_batch(
        &self,
        correlation_keys: &[String],
    ) -> Result<u64, CoordinatorError> {
        if correlation_keys.is_empty() {
            return Ok(0);
        }

        // SQLite has no array binds; build the placeholder list.
        let placeholders = correlation_keys
            .iter()
            .map(|_| "?")
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "DELETE FROM work_records WHERE correlation_key IN ({})",
            placeholders
        );

        let mut query = sqlx::query(&sql);
        for key in correlation_keys {
            query = query.bind(key);
        }
        let outcome = query.execute(&self.pool).await?;

        Ok(outcome.rows_affected())
    }

    async fn record_event(
        &self,
        correlation_key: &str,
        event_type: &str,
        detail: Option<&str>,
    ) -> Result<(), CoordinatorError> {
        sqlx::query(
            r#"
            INSERT INTO work_events (correlation_key, event_type, detail, created_at)
            VALUES (?, ?, ?, CURRENT_TIMESTAMP)
            "#,
        )
        .bind(correlation_key)
        .bind(event_type)
        .bind(detail)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_events(
        &self,
        correlation_key: &str,
        limit: i64,
    ) -> Result<Vec<WorkEventRecord>, CoordinatorError> {
        let events = sqlx::query_as::<_, WorkEventRecord>(
            r#"
            SELECT id, correlation_key, event_type, detail, created_at
            FROM work_events
            WHERE correlation_key = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(correlation_key)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    async fn health_check(&self) -> Result<(), CoordinatorError> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
