// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for anteroom-core integration tests.
//!
//! Provides TestContext wiring an in-memory store, a scriptable engine
//! double, and handler state the way the running service wires them.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::Mutex;

use anteroom_core::engine::{EngineTrigger, TriggerRequest};
use anteroom_core::error::{CoordinatorError, Result};
use anteroom_core::handlers::HandlerState;
use anteroom_core::persistence::{Persistence, SqlitePersistence, WorkEventRecord};
use anteroom_core::wait::WaitSettings;

/// How the engine double reacts to a trigger call.
#[derive(Debug, Clone)]
pub enum EngineBehavior {
    /// Accept the trigger; a completion signal must arrive some other way.
    AcceptOnly,
    /// Reject the trigger with the given reason.
    Reject(String),
    /// Accept, then complete the record with the payload after the delay.
    CompleteAfter(Duration, Vec<u8>),
    /// Accept, then fail the record with the error after the delay.
    FailAfter(Duration, String),
}

/// Engine double that records every trigger call and optionally signals
/// completion back through the shared store, like the real engine would.
pub struct TestEngine {
    behavior: EngineBehavior,
    persistence: Arc<dyn Persistence>,
    calls: Mutex<Vec<TriggerRequest>>,
}

#[async_trait]
impl EngineTrigger for TestEngine {
    async fn trigger(&self, request: &TriggerRequest) -> Result<()> {
        self.calls.lock().await.push(request.clone());

        match &self.behavior {
            EngineBehavior::AcceptOnly => Ok(()),
            EngineBehavior::Reject(reason) => Err(CoordinatorError::TriggerFailed {
                reason: reason.clone(),
            }),
            EngineBehavior::CompleteAfter(delay, payload) => {
                let persistence = self.persistence.clone();
                let correlation_key = request.correlation_key.clone();
                let payload = payload.clone();
                let delay = *delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = persistence.complete_record(&correlation_key, &payload).await;
                });
                Ok(())
            }
            EngineBehavior::FailAfter(delay, error) => {
                let persistence = self.persistence.clone();
                let correlation_key = request.correlation_key.clone();
                let error = error.clone();
                let delay = *delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = persistence.fail_record(&correlation_key, &error).await;
                });
                Ok(())
            }
        }
    }
}

/// Wait settings tightened for test speed.
pub fn fast_wait_settings() -> WaitSettings {
    WaitSettings {
        wait_timeout: Duration::from_millis(500),
        poll_floor: Duration::from_millis(10),
        poll_cap: Duration::from_millis(50),
        read_timeout: Duration::from_millis(250),
    }
}

/// Test context that manages the store, the engine double, and handler state.
pub struct TestContext {
    pub pool: SqlitePool,
    pub persistence: Arc<dyn Persistence>,
    pub engine: Arc<TestEngine>,
    pub state: Arc<HandlerState>,
}

impl TestContext {
    /// Create a test context with fast wait settings and a cleanup grace
    /// long enough that delayed deletes never fire during a test.
    pub async fn new(behavior: EngineBehavior) -> Self {
        Self::build(behavior, fast_wait_settings(), Duration::from_secs(60)).await
    }

    /// Create a test context with a custom wait deadline.
    pub async fn with_deadline(behavior: EngineBehavior, deadline: Duration) -> Self {
        let wait = WaitSettings {
            wait_timeout: deadline,
            ..fast_wait_settings()
        };
        Self::build(behavior, wait, Duration::from_secs(60)).await
    }

    /// Create a test context with a custom cleanup grace, for tests that
    /// exercise the delayed delete.
    pub async fn with_grace(behavior: EngineBehavior, grace: Duration) -> Self {
        Self::build(behavior, fast_wait_settings(), grace).await
    }

    async fn build(behavior: EngineBehavior, wait: WaitSettings, grace: Duration) -> Self {
        // In-memory sqlite lives and dies with its connection; a single
        // connection keeps every query on the same database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("connect to in-memory sqlite");

        anteroom_core::migrations::run_sqlite(&pool)
            .await
            .expect("run sqlite migrations");

        let persistence: Arc<dyn Persistence> = Arc::new(SqlitePersistence::new(pool.clone()));
        let engine = Arc::new(TestEngine {
            behavior,
            persistence: persistence.clone(),
            calls: Mutex::new(Vec::new()),
        });
        let state = Arc::new(HandlerState::new(
            persistence.clone(),
            engine.clone(),
            wait,
            grace,
        ));

        Self {
            pool,
            persistence,
            engine,
            state,
        }
    }

    /// Build the coordinator router over this context's state.
    pub fn router(&self) -> axum::Router {
        anteroom_core::http::build_router(self.state.clone())
    }

    /// Read the current status string for a key, if the record exists.
    pub async fn record_status(&self, correlation_key: &str) -> Option<String> {
        self.persistence
            .read_record(correlation_key)
            .await
            .expect("read record")
            .map(|record| record.status)
    }

    /// Total number of work records in the store.
    pub async fn record_count(&self) -> usize {
        self.persistence
            .list_records()
            .await
            .expect("list records")
            .len()
    }

    /// Audit event types recorded for a key, oldest first.
    pub async fn event_types(&self, correlation_key: &str) -> Vec<String> {
        let mut events: Vec<WorkEventRecord> = self
            .persistence
            .list_events(correlation_key, 50)
            .await
            .expect("list events");
        events.sort_by_key(|event| event.id);
        events.into_iter().map(|event| event.event_type).collect()
    }

    /// Number of trigger calls the engine double has seen.
    pub async fn trigger_calls(&self) -> usize {
        self.engine.calls.lock().await.len()
    }

    /// Trigger requests the engine double has seen, in arrival order.
    pub async fn trigger_requests(&self) -> Vec<TriggerRequest> {
        self.engine.calls.lock().await.clone()
    }

    /// Backdate a record's updated_at, simulating a record whose terminal
    /// transition (or creation) happened in the past.
    pub async fn backdate_record(&self, correlation_key: &str, age: Duration) {
        let timestamp = chrono::Utc::now()
            - chrono::Duration::from_std(age).expect("age fits in chrono duration");
        sqlx::query("UPDATE work_records SET updated_at = ? WHERE correlation_key = ?")
            .bind(timestamp)
            .bind(correlation_key)
            .execute(&self.pool)
            .await
            .expect("backdate record");
    }
}
