// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wait Engine: blocking wait-with-timeout over the state store.
//!
//! Waiters and signalers share no memory; a waiter learns about completion
//! only by polling the store. The loop below trades latency for operational
//! simplicity: geometric backoff bounds store load under many concurrent
//! waiters while the cap bounds worst-case detection latency.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::persistence::{Persistence, WorkRecord, WorkStatus};

/// Tunables for the wait loop.
#[derive(Debug, Clone)]
pub struct WaitSettings {
    /// Overall deadline for one wait call.
    pub wait_timeout: Duration,
    /// First poll interval.
    pub poll_floor: Duration,
    /// Maximum poll interval after doubling.
    pub poll_cap: Duration,
    /// Budget for a single store read; an overrun counts as "not yet".
    pub read_timeout: Duration,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_millis(25_000),
            poll_floor: Duration::from_millis(50),
            poll_cap: Duration::from_millis(1_000),
            read_timeout: Duration::from_millis(250),
        }
    }
}

/// Outcome of a wait.
#[derive(Debug, Clone)]
pub enum WaitOutcome {
    /// The work finished; the record carries the result payload.
    Completed(WorkRecord),
    /// The work failed; the record carries the error payload.
    Failed(WorkRecord),
    /// The deadline elapsed with the record still pending or absent.
    TimedOut {
        /// Returned to the caller so it can switch to out-of-band polling.
        correlation_key: String,
    },
}

/// Block until the record for `correlation_key` reaches a terminal state or
/// the deadline elapses.
///
/// Reads immediately, then polls on a schedule starting at the floor
/// interval and doubling up to the cap, each sleep clamped to the remaining
/// deadline. A read error or budget overrun is treated as "not yet":
/// transient store failures never abort a wait. A missing row is
/// indistinguishable from pending (the creator's upsert may not have
/// committed yet) and the loop simply continues.
pub async fn wait_for_terminal(
    persistence: &dyn Persistence,
    correlation_key: &str,
    settings: &WaitSettings,
) -> WaitOutcome {
    let deadline = Instant::now() + settings.wait_timeout;
    let mut delay = settings.poll_floor;

    loop {
        let read = tokio::time::timeout(
            settings.read_timeout,
            persistence.read_record(correlation_key),
        )
        .await;

        match read {
            Ok(Ok(Some(record))) => match WorkStatus::parse(&record.status) {
                Some(WorkStatus::Done) => return WaitOutcome::Completed(record),
                Some(WorkStatus::Error) => return WaitOutcome::Failed(record),
                _ => {}
            },
            Ok(Ok(None)) => {}
            Ok(Err(e)) => {
                debug!(correlation_key, error = %e, "Poll read failed, treating as not yet");
            }
            Err(_) => {
                debug!(correlation_key, "Poll read overran its budget, treating as not yet");
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return WaitOutcome::TimedOut {
                correlation_key: correlation_key.to_string(),
            };
        }

        tokio::time::sleep(delay.min(deadline - now)).await;
        delay = delay.saturating_mul(2).min(settings.poll_cap);
    }
}
