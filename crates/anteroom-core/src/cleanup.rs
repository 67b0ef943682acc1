// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Removal of work records that have served their purpose.
//!
//! Two mechanisms cooperate:
//! 1. A per-key delayed delete, spawned when a record turns terminal.
//!    The grace delay leaves the record readable for a short window so
//!    late status polls still see the outcome.
//! 2. A background sweeper that reclaims what the fast path missed:
//!    terminal records orphaned by a crash before their delete ran, and
//!    pending records whose completion signal never arrived.
//!
//! Audit events in `work_events` are never swept; they are the durable
//! trace of what happened to a key.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::persistence::Persistence;

/// Schedule a one-shot delete of `correlation_key` after `grace`.
///
/// Spawned by the signal path once a record turns terminal. The returned
/// handle is dropped by request-path callers; tests await it.
pub fn schedule_delayed_delete(
    persistence: Arc<dyn Persistence>,
    correlation_key: String,
    grace: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        match persistence.delete_record(&correlation_key).await {
            Ok(true) => {
                debug!(correlation_key = %correlation_key, "Deleted terminal work record");
                if let Err(e) = persistence
                    .record_event(&correlation_key, "record_deleted", Some("grace elapsed"))
                    .await
                {
                    warn!(
                        correlation_key = %correlation_key,
                        error = %e,
                        "Failed to record deletion event"
                    );
                }
            }
            Ok(false) => {
                debug!(correlation_key = %correlation_key, "Work record already gone");
            }
            Err(e) => {
                warn!(
                    correlation_key = %correlation_key,
                    error = %e,
                    "Delayed delete failed, record left for the sweeper"
                );
            }
        }
    })
}

/// Configuration for the cleanup worker.
#[derive(Debug, Clone)]
pub struct CleanupWorkerConfig {
    /// How often to sweep. Zero disables the worker.
    pub poll_interval: Duration,
    /// Maximum records to delete per batch (prevents long transactions).
    pub batch_size: i64,
    /// Age past which a terminal record is overdue for deletion.
    pub grace: Duration,
    /// Age past which a pending record is considered abandoned.
    pub pending_max_age: Duration,
}

impl Default for CleanupWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            batch_size: 100,
            grace: Duration::from_millis(5_000),
            pending_max_age: Duration::from_secs(86_400),
        }
    }
}

impl CleanupWorkerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `ANTEROOM_SWEEP_INTERVAL_SECS`: seconds between sweeps, 0 disables (default: 60)
    /// - `ANTEROOM_SWEEP_BATCH_SIZE`: max records per batch (default: 100)
    /// - `ANTEROOM_CLEANUP_GRACE_MS`: ms before a terminal record is overdue (default: 5000)
    /// - `ANTEROOM_PENDING_MAX_AGE_SECS`: seconds before a pending record is abandoned (default: 86400)
    pub fn from_env() -> Self {
        let poll_interval_secs = std::env::var("ANTEROOM_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        let batch_size = std::env::var("ANTEROOM_SWEEP_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100);

        let grace_ms = std::env::var("ANTEROOM_CLEANUP_GRACE_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5_000);

        let pending_max_age_secs = std::env::var("ANTEROOM_PENDING_MAX_AGE_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(86_400);

        Self {
            poll_interval: Duration::from_secs(poll_interval_secs),
            batch_size,
            grace: Duration::from_millis(grace_ms),
            pending_max_age: Duration::from_secs(pending_max_age_secs),
        }
    }
}

/// Background worker that sweeps expired work records.
pub struct CleanupWorker {
    persistence: Arc<dyn Persistence>,
    config: CleanupWorkerConfig,
    shutdown: Arc<Notify>,
}

impl CleanupWorker {
    /// Create a new cleanup worker.
    pub fn new(persistence: Arc<dyn Persistence>, config: CleanupWorkerConfig) -> Self {
        Self {
            persistence,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the sweep loop.
    ///
    /// Exits immediately if the poll interval is zero, otherwise loops
    /// until the shutdown signal is received.
    pub async fn run(&self) {
        if self.config.poll_interval.is_zero() {
            info!("Cleanup worker disabled");
            return;
        }

        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            batch_size = self.config.batch_size,
            grace_ms = self.config.grace.as_millis() as u64,
            pending_max_age_secs = self.config.pending_max_age.as_secs(),
            "Cleanup worker started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Cleanup worker received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.poll_interval) => {
                    if let Err(e) = self.sweep_expired_records().await {
                        error!(error = %e, "Sweep cycle failed");
                    }
                }
            }
        }

        info!("Cleanup worker stopped");
    }

    /// One sweep cycle: overdue terminal records, then abandoned pending ones.
    async fn sweep_expired_records(&self) -> Result<()> {
        let now = Utc::now();

        let mut removed_terminal = 0u64;
        let terminal_cutoff = cutoff_before(now, self.config.grace);
        loop {
            let keys = self
                .persistence
                .terminal_records_older_than(terminal_cutoff, self.config.batch_size)
                .await?;

            if keys.is_empty() {
                break;
            }

            let batch_len = keys.len();
            removed_terminal += self.persistence.delete_records_batch(&keys).await?;

            debug!(
                batch_len = batch_len,
                removed = removed_terminal,
                "Swept batch of terminal work records"
            );

            if batch_len < self.config.batch_size as usize {
                break;
            }
        }

        let mut removed_pending = 0u64;
        let pending_cutoff = cutoff_before(now, self.config.pending_max_age);
        loop {
            let keys = self
                .persistence
                .pending_records_older_than(pending_cutoff, self.config.batch_size)
                .await?;

            if keys.is_empty() {
                break;
            }

            let batch_len = keys.len();
            removed_pending += self.persistence.delete_records_batch(&keys).await?;

            warn!(
                batch_len = batch_len,
                "Reaped pending work records that never received a signal"
            );

            if batch_len < self.config.batch_size as usize {
                break;
            }
        }

        if removed_terminal > 0 || removed_pending > 0 {
            info!(
                removed_terminal = removed_terminal,
                removed_pending = removed_pending,
                "Sweep cycle completed"
            );
        } else {
            debug!("Sweep cycle completed, nothing to remove");
        }

        Ok(())
    }
}

/// `now - age`, saturating to the minimum representable instant so an
/// absurd age disables the sweep instead of wrapping.
fn cutoff_before(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
