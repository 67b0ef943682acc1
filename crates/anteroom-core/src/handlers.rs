// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Coordination handlers for anteroom-core.
//!
//! These handlers implement the three boundary operations: begin a unit of
//! work, signal its completion, and read its status. The transport layer
//! adapts them to HTTP.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::cleanup::schedule_delayed_delete;
use crate::engine::{EngineTrigger, TriggerRequest};
use crate::error::{CoordinatorError, Result};
use crate::persistence::{Persistence, WorkRecord};
use crate::wait::{WaitOutcome, WaitSettings, wait_for_terminal};

/// Shared state for coordination handlers.
pub struct HandlerState {
    /// State store shared with every other coordinator process.
    pub persistence: Arc<dyn Persistence>,
    /// Outbound seam to the workflow engine.
    pub engine: Arc<dyn EngineTrigger>,
    /// Wait loop tunables.
    pub wait: WaitSettings,
    /// Delay before a terminal record is removed from the fast path.
    pub cleanup_grace: Duration,
}

impl HandlerState {
    /// Create handler state over the given store and engine seam.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        engine: Arc<dyn EngineTrigger>,
        wait: WaitSettings,
        cleanup_grace: Duration,
    ) -> Self {
        Self {
            persistence,
            engine,
            wait,
            cleanup_grace,
        }
    }
}

// ============================================================================
// Begin
// ============================================================================

/// Request to begin a unit of work.
#[derive(Debug, Clone, Deserialize)]
pub struct BeginRequest {
    /// Caller-chosen key identifying this unit of work.
    pub correlation_key: String,
    /// Which workflow the engine should run.
    pub work_descriptor: String,
    /// Opaque inputs forwarded to the engine.
    #[serde(default)]
    pub inputs: serde_json::Value,
}

/// Handle a begin request.
///
/// Records the work as pending, triggers the external engine with the
/// correlation key, then blocks on the store until the engine's completion
/// signal lands or the wait deadline elapses. Duplicate begins for the same
/// key are safe: the upsert never duplicates a row and never reverts a
/// terminal one, so a retried begin simply waits on the existing record.
///
/// # Errors
///
/// Returns an error only before waiting begins: an invalid request, a
/// failed record write, or a rejected engine trigger. After the trigger
/// succeeds every outcome (done, failed, timeout) is a [`WaitOutcome`].
#[instrument(skip(state, request), fields(correlation_key = %request.correlation_key))]
pub async fn handle_begin(state: &HandlerState, request: BeginRequest) -> Result<WaitOutcome> {
    info!(work_descriptor = %request.work_descriptor, "Work requested");

    // 1. Validate the request
    if request.correlation_key.is_empty() {
        return Err(CoordinatorError::ValidationError {
            field: "correlation_key".to_string(),
            message: "must not be empty".to_string(),
        });
    }
    if request.work_descriptor.is_empty() {
        return Err(CoordinatorError::ValidationError {
            field: "work_descriptor".to_string(),
            message: "must not be empty".to_string(),
        });
    }

    // 2. Record the work as pending
    state
        .persistence
        .upsert_pending(&request.correlation_key)
        .await?;

    // 3. Insert started event
    if let Err(e) = state
        .persistence
        .record_event(
            &request.correlation_key,
            "work_started",
            Some(&request.work_descriptor),
        )
        .await
    {
        warn!("Failed to insert work_started event: {}", e);
        // Don't fail the request just because audit logging failed
    }

    // 4. Trigger the engine. On failure the record stays pending: a caller
    //    retry reuses it, and the sweeper reaps it if no retry comes.
    let trigger = TriggerRequest {
        correlation_key: request.correlation_key,
        work_descriptor: request.work_descriptor,
        inputs: request.inputs,
    };
    state.engine.trigger(&trigger).await?;

    // 5. Block until the completion signal lands or the deadline elapses
    let outcome = wait_for_terminal(
        state.persistence.as_ref(),
        &trigger.correlation_key,
        &state.wait,
    )
    .await;

    match &outcome {
        WaitOutcome::Completed(_) => info!("Work completed within deadline"),
        WaitOutcome::Failed(_) => info!("Work failed within deadline"),
        WaitOutcome::TimedOut { .. } => {
            info!("Wait deadline elapsed, caller switches to status polling")
        }
    }

    Ok(outcome)
}

// ============================================================================
// Completion Signal
// ============================================================================

/// Disposition carried by a completion signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalOutcome {
    /// The work finished; `payload` is the result.
    Success,
    /// The work failed; `payload` describes the failure.
    Failure,
}

/// Completion signal from the external engine.
#[derive(Debug, Clone, Deserialize)]
pub struct SignalRequest {
    /// Key of the unit of work being completed.
    pub correlation_key: String,
    /// Whether the work succeeded or failed.
    pub outcome: SignalOutcome,
    /// Result or failure payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Acknowledgment returned for every completion signal.
#[derive(Debug, Clone, Serialize)]
pub struct SignalReceipt {
    /// Key the signal addressed.
    pub correlation_key: String,
    /// Whether the terminal write reached the store.
    pub recorded: bool,
    /// Whether a record existed before the write. Informational: a signal
    /// may legitimately race ahead of the begin bookkeeping.
    pub record_existed: bool,
}

/// Handle a completion signal.
///
/// Performs exactly one idempotent terminal write. A second signal for an
/// already-terminal key is acknowledged without touching the stored
/// payload. This never errors: the engine retries on failure responses, so
/// even a store write failure is acknowledged, with `recorded: false`.
#[instrument(skip(state, request), fields(correlation_key = %request.correlation_key))]
pub async fn handle_signal(state: &HandlerState, request: SignalRequest) -> SignalReceipt {
    info!(outcome = ?request.outcome, "Completion signal received");

    // 1. Acknowledge junk instead of erroring
    if request.correlation_key.is_empty() {
        warn!("Completion signal without correlation key, acknowledged without recording");
        return SignalReceipt {
            correlation_key: request.correlation_key,
            recorded: false,
            record_existed: false,
        };
    }

    // 2. One terminal write
    let applied = match request.outcome {
        SignalOutcome::Success => match serde_json::to_vec(&request.payload) {
            Ok(result) => {
                state
                    .persistence
                    .complete_record(&request.correlation_key, &result)
                    .await
            }
            Err(e) => Err(e.into()),
        },
        SignalOutcome::Failure => {
            state
                .persistence
                .fail_record(&request.correlation_key, &request.payload.to_string())
                .await
        }
    };

    let applied = match applied {
        Ok(applied) => applied,
        Err(e) => {
            error!(error = %e, "Failed to record completion signal");
            return SignalReceipt {
                correlation_key: request.correlation_key,
                recorded: false,
                record_existed: false,
            };
        }
    };

    if applied.transitioned {
        // 3. Schedule the delayed delete and insert the terminal event,
        //    only for the write that actually transitioned the record
        let _ = schedule_delayed_delete(
            state.persistence.clone(),
            request.correlation_key.clone(),
            state.cleanup_grace,
        );

        let event_type = match request.outcome {
            SignalOutcome::Success => "work_completed",
            SignalOutcome::Failure => "work_failed",
        };
        if let Err(e) = state
            .persistence
            .record_event(&request.correlation_key, event_type, None)
            .await
        {
            warn!("Failed to insert {} event: {}", event_type, e);
        }

        if !applied.record_existed {
            info!("Signal arrived before the work record, created it terminal");
        }
    } else {
        debug!("Record already terminal, duplicate signal acknowledged");
    }

    SignalReceipt {
        correlation_key: request.correlation_key,
        recorded: true,
        record_existed: applied.record_existed,
    }
}

// ============================================================================
// Status
// ============================================================================

/// Handle a status lookup.
///
/// Plain point read. The record may legitimately be gone: terminal records
/// are removed after the cleanup grace, and unknown keys were never
/// recorded. Both read as [`CoordinatorError::RecordNotFound`].
#[instrument(skip(state), fields(correlation_key = %correlation_key))]
pub async fn handle_status(state: &HandlerState, correlation_key: &str) -> Result<WorkRecord> {
    debug!("Status lookup");

    state
        .persistence
        .read_record(correlation_key)
        .await?
        .ok_or_else(|| CoordinatorError::RecordNotFound {
            correlation_key: correlation_key.to_string(),
        })
}

/// Handle an operational listing of all live records, newest first.
pub async fn handle_list(state: &HandlerState) -> Result<Vec<WorkRecord>> {
    state.persistence.list_records().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use sqlx::SqlitePool;
    use sqlx::sqlite::SqlitePoolOptions;

    use crate::persistence::{SqlitePersistence, WorkStatus};

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        crate::migrations::run_sqlite(&pool).await.expect("migrations");
        pool
    }

    /// Trigger double that records calls and optionally rejects them.
    #[derive(Default)]
    struct RecordingTrigger {
        calls: Mutex<Vec<TriggerRequest>>,
        reject: bool,
    }

    #[async_trait]
    impl EngineTrigger for RecordingTrigger {
        async fn trigger(&self, request: &TriggerRequest) -> Result<()> {
            self.calls.lock().unwrap().push(request.clone());
            if self.reject {
                return Err(CoordinatorError::TriggerFailed {
                    reason: "engine offline".to_string(),
                });
            }
            Ok(())
        }
    }

    /// Trigger double that completes the work out of band after a delay,
    /// the way a real engine reports back through the signal endpoint.
    struct CompletingTrigger {
        persistence: Arc<dyn Persistence>,
        delay: Duration,
        result: Vec<u8>,
    }

    #[async_trait]
    impl EngineTrigger for CompletingTrigger {
        async fn trigger(&self, request: &TriggerRequest) -> Result<()> {
            let persistence = self.persistence.clone();
            let correlation_key = request.correlation_key.clone();
            let delay = self.delay;
            let result = self.result.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = persistence.complete_record(&correlation_key, &result).await;
            });
            Ok(())
        }
    }

    fn state_with(
        persistence: Arc<dyn Persistence>,
        engine: Arc<dyn EngineTrigger>,
        wait_timeout: Duration,
    ) -> HandlerState {
        HandlerState::new(
            persistence,
            engine,
            WaitSettings {
                wait_timeout,
                ..Default::default()
            },
            Duration::from_millis(5_000),
        )
    }

    fn begin_request(correlation_key: &str) -> BeginRequest {
        BeginRequest {
            correlation_key: correlation_key.to_string(),
            work_descriptor: "sync-order".to_string(),
            inputs: serde_json::json!({"order_id": 7}),
        }
    }

    #[tokio::test]
    async fn test_begin_rejects_empty_correlation_key() {
        let store = Arc::new(SqlitePersistence::new(test_pool().await));
        let state = state_with(
            store,
            Arc::new(RecordingTrigger::default()),
            Duration::from_millis(200),
        );

        let err = handle_begin(&state, begin_request("")).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::ValidationError { .. }));
    }

    #[tokio::test]
    async fn test_begin_rejects_empty_work_descriptor() {
        let store = Arc::new(SqlitePersistence::new(test_pool().await));
        let state = state_with(
            store,
            Arc::new(RecordingTrigger::default()),
            Duration::from_millis(200),
        );

        let mut request = begin_request("k1");
        request.work_descriptor = String::new();
        let err = handle_begin(&state, request).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::ValidationError { .. }));
    }

    #[tokio::test]
    async fn test_begin_passes_correlation_key_to_engine() {
        let store = Arc::new(SqlitePersistence::new(test_pool().await));
        let trigger = Arc::new(RecordingTrigger::default());
        let state = state_with(store, trigger.clone(), Duration::from_millis(100));

        let _ = handle_begin(&state, begin_request("k1")).await.unwrap();

        let calls = trigger.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].correlation_key, "k1");
        assert_eq!(calls[0].work_descriptor, "sync-order");
        assert_eq!(calls[0].inputs, serde_json::json!({"order_id": 7}));
    }

    #[tokio::test]
    async fn test_begin_trigger_failure_leaves_record_pending() {
        let store = Arc::new(SqlitePersistence::new(test_pool().await));
        let trigger = Arc::new(RecordingTrigger {
            calls: Mutex::new(vec![]),
            reject: true,
        });
        let state = state_with(store.clone(), trigger, Duration::from_millis(200));

        let err = handle_begin(&state, begin_request("k1")).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::TriggerFailed { .. }));

        // A retried begin reuses the pending record; the sweeper reaps it
        // if no retry ever comes.
        let record = store.read_record("k1").await.unwrap().unwrap();
        assert_eq!(record.status, WorkStatus::Pending.as_str());
    }

    #[tokio::test]
    async fn test_begin_returns_result_when_engine_completes() {
        let store: Arc<dyn Persistence> = Arc::new(SqlitePersistence::new(test_pool().await));
        let trigger = Arc::new(CompletingTrigger {
            persistence: store.clone(),
            delay: Duration::from_millis(50),
            result: b"{\"x\":1}".to_vec(),
        });
        let state = state_with(store, trigger, Duration::from_secs(25));

        let outcome = handle_begin(&state, begin_request("k1")).await.unwrap();

        match outcome {
            WaitOutcome::Completed(record) => {
                assert_eq!(record.result_payload.as_deref(), Some(b"{\"x\":1}".as_ref()));
            }
            other => panic!("expected Completed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_begin_times_out_into_polling_handle() {
        let store = Arc::new(SqlitePersistence::new(test_pool().await));
        let state = state_with(
            store.clone(),
            Arc::new(RecordingTrigger::default()),
            Duration::from_millis(200),
        );

        let outcome = handle_begin(&state, begin_request("k2")).await.unwrap();

        match outcome {
            WaitOutcome::TimedOut { correlation_key } => assert_eq!(correlation_key, "k2"),
            other => panic!("expected TimedOut, got {:?}", other),
        }

        // The record outlives the abandoned wait; a later signal still lands.
        let record = store.read_record("k2").await.unwrap().unwrap();
        assert_eq!(record.status, WorkStatus::Pending.as_str());
    }

    fn signal_request(
        correlation_key: &str,
        outcome: SignalOutcome,
        payload: serde_json::Value,
    ) -> SignalRequest {
        SignalRequest {
            correlation_key: correlation_key.to_string(),
            outcome,
            payload,
        }
    }

    #[tokio::test]
    async fn test_signal_acknowledges_empty_key_without_recording() {
        let store = Arc::new(SqlitePersistence::new(test_pool().await));
        let state = state_with(
            store,
            Arc::new(RecordingTrigger::default()),
            Duration::from_millis(200),
        );

        let receipt = handle_signal(
            &state,
            signal_request("", SignalOutcome::Success, serde_json::json!({})),
        )
        .await;

        assert!(!receipt.recorded);
        assert!(!receipt.record_existed);
    }

    #[tokio::test]
    async fn test_signal_success_records_result_and_audit_event() {
        let store = Arc::new(SqlitePersistence::new(test_pool().await));
        let state = state_with(
            store.clone(),
            Arc::new(RecordingTrigger::default()),
            Duration::from_millis(200),
        );
        store.upsert_pending("k1").await.unwrap();

        let receipt = handle_signal(
            &state,
            signal_request("k1", SignalOutcome::Success, serde_json::json!({"x": 1})),
        )
        .await;

        assert!(receipt.recorded);
        assert!(receipt.record_existed);

        // Grace delay: the record must still be readable immediately after
        // completion even though its delete has been scheduled.
        let record = store.read_record("k1").await.unwrap().unwrap();
        assert_eq!(record.status, WorkStatus::Done.as_str());
        assert_eq!(record.result_payload.as_deref(), Some(br#"{"x":1}"#.as_ref()));

        let events = store.list_events("k1", 10).await.unwrap();
        assert!(events.iter().any(|e| e.event_type == "work_completed"));
    }

    #[tokio::test]
    async fn test_signal_failure_records_error_payload() {
        let store = Arc::new(SqlitePersistence::new(test_pool().await));
        let state = state_with(
            store.clone(),
            Arc::new(RecordingTrigger::default()),
            Duration::from_millis(200),
        );

        // No pending record: the signal races ahead of begin and still lands.
        let receipt = handle_signal(
            &state,
            signal_request(
                "k1",
                SignalOutcome::Failure,
                serde_json::json!({"reason": "step 3 exploded"}),
            ),
        )
        .await;

        assert!(receipt.recorded);
        assert!(!receipt.record_existed);

        let record = store.read_record("k1").await.unwrap().unwrap();
        assert_eq!(record.status, WorkStatus::Error.as_str());
        assert_eq!(
            record.error_payload.as_deref(),
            Some(r#"{"reason":"step 3 exploded"}"#)
        );

        let events = store.list_events("k1", 10).await.unwrap();
        assert!(events.iter().any(|e| e.event_type == "work_failed"));
    }

    #[tokio::test]
    async fn test_second_signal_preserves_first_payload() {
        let store = Arc::new(SqlitePersistence::new(test_pool().await));
        let state = state_with(
            store.clone(),
            Arc::new(RecordingTrigger::default()),
            Duration::from_millis(200),
        );
        store.upsert_pending("k1").await.unwrap();

        let first = handle_signal(
            &state,
            signal_request("k1", SignalOutcome::Success, serde_json::json!({"x": 1})),
        )
        .await;
        let second = handle_signal(
            &state,
            signal_request("k1", SignalOutcome::Failure, serde_json::json!("late failure")),
        )
        .await;

        // Both acknowledged; the first terminal payload is retained.
        assert!(first.recorded);
        assert!(second.recorded);

        let record = store.read_record("k1").await.unwrap().unwrap();
        assert_eq!(record.status, WorkStatus::Done.as_str());
        assert_eq!(record.result_payload.as_deref(), Some(br#"{"x":1}"#.as_ref()));
        assert!(record.error_payload.is_none());
    }

    #[tokio::test]
    async fn test_signal_store_failure_is_acknowledged_unrecorded() {
        let pool = test_pool().await;
        let store = Arc::new(SqlitePersistence::new(pool.clone()));
        let state = state_with(
            store,
            Arc::new(RecordingTrigger::default()),
            Duration::from_millis(200),
        );
        pool.close().await;

        let receipt = handle_signal(
            &state,
            signal_request("k1", SignalOutcome::Success, serde_json::json!({"x": 1})),
        )
        .await;

        assert!(!receipt.recorded);
        assert!(!receipt.record_existed);
    }

    #[tokio::test]
    async fn test_status_reads_record() {
        let store = Arc::new(SqlitePersistence::new(test_pool().await));
        let state = state_with(
            store.clone(),
            Arc::new(RecordingTrigger::default()),
            Duration::from_millis(200),
        );
        store.upsert_pending("k1").await.unwrap();

        let record = handle_status(&state, "k1").await.unwrap();
        assert_eq!(record.correlation_key, "k1");
        assert_eq!(record.status, WorkStatus::Pending.as_str());
    }

    #[tokio::test]
    async fn test_status_unknown_key_is_not_found() {
        let store = Arc::new(SqlitePersistence::new(test_pool().await));
        let state = state_with(
            store,
            Arc::new(RecordingTrigger::default()),
            Duration::from_millis(200),
        );

        let err = handle_status(&state, "missing").await.unwrap_err();
        assert!(matches!(err, CoordinatorError::RecordNotFound { .. }));
    }
}
