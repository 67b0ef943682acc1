// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL state store operations for anteroom-core.
//!
//! All durable coordination between waiters and signalers happens through
//! the conditional upserts in this module.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::CoordinatorError;

use super::{Persistence, SignalApplied, WorkEventRecord, WorkRecord, WorkStatus};

/// PostgreSQL-backed state store.
#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Create a new Postgres-backed state store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Work Record Operations
// ============================================================================

/// Whether a row currently exists for the key. Informational snapshot used
/// by the signal path; it may race with concurrent writers.
async fn record_exists(pool: &PgPool, correlation_key: &str) -> Result<bool, CoordinatorError> {
    let (exists,): (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS(SELECT 1 FROM work_records WHERE correlation_key = $1)
        "#,
    )
    .bind(correlation_key)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

/// Create a pending record, or refresh `updated_at` if the key is already
/// pending. A terminal row is left untouched: the conditional update only
/// applies while status is 'pending', so a completion that raced ahead of
/// this call is never reverted.
pub async fn upsert_pending(pool: &PgPool, correlation_key: &str) -> Result<(), CoordinatorError> {
    sqlx::query(
        r#"
        INSERT INTO work_records (correlation_key, status, started_at, updated_at)
        VALUES ($1, 'pending'::work_status, NOW(), NOW())
        ON CONFLICT (correlation_key) DO UPDATE
        SET updated_at = NOW()
        WHERE work_records.status = 'pending'
        "#,
    )
    .bind(correlation_key)
    .execute(pool)
    .await?;

    Ok(())
}

/// One conditional terminal write, shared by complete and fail.
///
/// Inserts the row already terminal when absent, transitions a pending row,
/// and leaves an existing terminal row untouched (rows_affected 0). The
/// first terminal payload always wins.
async fn terminal_upsert(
    pool: &PgPool,
    correlation_key: &str,
    status: WorkStatus,
    result: Option<&[u8]>,
    error: Option<&str>,
) -> Result<SignalApplied, CoordinatorError> {
    let record_existed = record_exists(pool, correlation_key).await?;

    let outcome = sqlx::query(
        r#"
        INSERT INTO work_records (correlation_key, status, result_payload, error_payload, started_at, updated_at)
        VALUES ($1, $2::work_status, $3, $4, NOW(), NOW())
        ON CONFLICT (correlation_key) DO UPDATE
        SET status = EXCLUDED.status,
            result_payload = EXCLUDED.result_payload,
            error_payload = EXCLUDED.error_payload,
            updated_at = NOW()
        WHERE work_records.status = 'pending'
        "#,
    )
    .bind(correlation_key)
    .bind(status.as_str())
    .bind(result)
    .bind(error)
    .execute(pool)
    .await?;

    Ok(SignalApplied {
        record_existed,
        transitioned: outcome.rows_affected() > 0,
    })
}

/// Mark the record done with a result payload.
pub async fn complete_record(
    pool: &PgPool,
    correlation_key: &str,
    result: &[u8],
) -> Result<SignalApplied, CoordinatorError> {
    terminal_upsert(pool, correlation_key, WorkStatus::Done, Some(result), None).await
}

/// Mark the record failed with an error payload.
pub async fn fail_record(
    pool: &PgPool,
    correlation_key: &str,
    error: &str,
) -> Result<SignalApplied, CoordinatorError> {
    terminal_upsert(pool, correlation_key, WorkStatus::Error, None, Some(error)).await
}

/// Point read of a single record.
pub async fn read_record(
    pool: &PgPool,
    correlation_key: &str,
) -> Result<Option<WorkRecord>, CoordinatorError> {
    let record = sqlx::query_as::<_, WorkRecord>(
        r#"
        SELECT correlation_key, status::text as status, result_payload, error_payload,
               started_at, updated_at
        FROM work_records
        WHERE correlation_key = $1
        "#,
    )
    .bind(correlation_key)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// List all records, newest first.
pub async fn list_records(pool: &PgPool) -> Result<Vec<WorkRecord>, CoordinatorError> {
    let records = sqlx::query_as::<_, WorkRecord>(
        r#"
        SELECT correlation_key, status::text as status, result_payload, error_payload,
               started_at, updated_at
        FROM work_records
        ORDER BY started_at DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(records)
}

/// Delete a single record. Returns whether a row was removed.
pub async fn delete_record(
    pool: &PgPool,
    correlation_key: &str,
) -> Result<bool, CoordinatorError> {
    let outcome = sqlx::query(
        r#"
        DELETE FROM work_records WHERE correlation_key = $1
        "#,
    )
    .bind(correlation_key)
    .execute(pool)
    .await?;

    Ok(outcome.rows_affected() > 0)
}

/// Keys of terminal records last written before the cutoff, oldest first.
pub async fn terminal_records_older_than(
    pool: &PgPool,
    older_than: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<String>, CoordinatorError> {
    let keys = sqlx::query_scalar::<_, String>(
        r#"
        SELECT correlation_key
        FROM work_records
        WHERE status IN ('done', 'error') AND updated_at < $1
        ORDER BY updated_at ASC
        LIMIT $2
        "#,
    )
    .bind(older_than)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(keys)
}

/// Keys of pending records last written before the cutoff, oldest first.
pub async fn pending_records_older_than(
    pool: &PgPool,
    older_than: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<String>, CoordinatorError> {
    let keys = sqlx::query_scalar::<_, String>(
        r#"
        SELECT correlation_key
        FROM work_records
        WHERE status = 'pending' AND updated_at < $1
        ORDER BY updated_at ASC
        LIMIT $2
        "#,
    )
    .bind(older_than)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(keys)
}

/// Delete records by key. Returns the count of deleted rows.
pub async fn delete_records_batch(
    pool: &PgPool,
    correlation_keys: &[String],
) -> Result<u64, CoordinatorError> {
    if correlation_keys.is_empty() {
        return Ok(0);
    }

    let outcome = sqlx::query(
        r#"
        DELETE FROM work_records WHERE correlation_key = ANY($1)
        "#,
    )
    .bind(correlation_keys)
    .execute(pool)
    .await?;

    Ok(outcome.rows_affected())
}

// ============================================================================
// Audit Events
// ============================================================================

/// Append an audit event.
pub async fn record_event(
    pool: &PgPool,
    correlation_key: &str,
    event_type: &str,
    detail: Option<&str>,
) -> Result<(), CoordinatorError> {
    sqlx::query(
        r#"
        INSERT INTO work_events (correlation_key, event_type, detail, created_at)
        VALUES ($1, $2, $3, NOW())
        "#,
    )
    .bind(correlation_key)
    .bind(event_type)
    .bind(detail)
    .execute(pool)
    .await?;

    Ok(())
}

/// List audit events for a key, newest first.
pub async fn list_events(
    pool: &PgPool,
    correlation_key: &str,
    limit: i64,
) -> Result<Vec<WorkEventRecord>, CoordinatorError> {
    let events = sqlx::query_as::<_, WorkEventRecord>(
        r#"
        SELECT id, correlation_key, event_type, detail, created_at
        FROM work_events
        WHERE correlation_key = $1
        ORDER BY created_at DESC, id DESC
        LIMIT $2
        "#,
    )
    .bind(correlation_key)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(events)
}

/// Check database health.
pub async fn health_check_db(pool: &PgPool) -> Result<(), CoordinatorError> {
    let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(pool).await?;
    Ok(())
}

#[async_trait::async_trait]
impl Persistence for PostgresPersistence {
    async fn upsert_pending(&self, correlation_key: &str) -> Result<(), CoordinatorError> {
        upsert_pending(&self.pool, correlation_key).await
    }

    async fn complete_record(
        &self,
        correlation_key: &str,
        result: &[u8],
    ) -> Result<SignalApplied, CoordinatorError> {
        complete_record(&self.pool, correlation_key, result).await
    }

    async fn fail_record(
        &self,
        correlation_key: &str,
        error: &str,
    ) -> Result<SignalApplied, CoordinatorError> {
        fail_record(&self.pool, correlation_key, error).await
    }

    async fn read_record(
        &self,
        correlation_key: &str,
    ) -> Result<Option<WorkRecord>, CoordinatorError> {
        read_record(&self.pool, correlation_key).await
    }

    async fn list_records(&self) -> Result<Vec<WorkRecord>, CoordinatorError> {
        list_records(&self.pool).await
    }

    async fn delete_record(&self, correlation_key: &str) -> Result<bool, CoordinatorError> {
        delete_record(&self.pool, correlation_key).await
    }

    async fn terminal_records_older_than(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<String>, CoordinatorError> {
        terminal_records_older_than(&self.pool, older_than, limit).await
    }

    async fn pending_records_older_than(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<String>, CoordinatorError> {
        pending_records_older_than(&self.pool, older_than, limit).await
    }

    async fn delete_records_batch(
        &self,
        correlation_keys: &[String],
    ) -> Result<u64, CoordinatorError> {
        delete_records_batch(&self.pool, correlation_keys).await
    }

    async fn record_event(
        &self,
        correlation_key: &str,
        event_type: &str,
        detail: Option<&str>,
    ) -> Result<(), CoordinatorError> {
        record_event(&self.pool, correlation_key, event_type, detail).await
    }

    async fn list_events(
        &self,
        correlation_key: &str,
        limit: i64,
    ) -> Result<Vec<WorkEventRecord>, CoordinatorError> {
        list_events(&self.pool, correlation_key, limit).await
    }

    async fn health_check(&self) -> Result<(), CoordinatorError> {
        health_check_db(&self.pool).await
    }
}
