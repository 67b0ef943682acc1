// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Anteroom Core - Correlation Completion Coordinator
//!
//! This crate lets a caller issue a request that starts a long-running,
//! externally-orchestrated unit of work and receive either the result
//! (if the work finishes quickly) or a durable handle to poll later. The
//! waiting caller and the completing engine may live in different
//! processes on different hosts; they coordinate exclusively through a
//! shared PostgreSQL store, never through process memory.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            Callers                              │
//! │            (anteroom-client, upstream services, curl)           │
//! └─────────────────────────────────────────────────────────────────┘
//!        │ POST /api/v1/work                  ▲ 200 result
//!        ▼                                    │ 202 poll handle
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        anteroom-core                            │
//! │     record PENDING ─▶ trigger engine ─▶ poll until terminal     │
//! │                      HTTP on port 8080                          │
//! └─────────────────────────────────────────────────────────────────┘
//!        │ POST engine URL                    ▲ POST /api/v1/work/complete
//!        │ (correlation key passes through)   │ (same correlation key)
//!        ▼                                    │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Workflow engine                           │
//! │        (opaque collaborator, out of scope for this crate)       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All durable state lives in PostgreSQL (`work_records` fast path,
//! `work_events` append-only audit mirror). Multiple anteroom-core
//! replicas can serve the same store: the waiter and the signaler need
//! not be the same process.
//!
//! # HTTP Operations
//!
//! | Operation | Route | Description |
//! |-----------|-------|-------------|
//! | Begin | `POST /api/v1/work` | Record work, trigger the engine, block until done or deadline |
//! | Complete | `POST /api/v1/work/complete` | Completion signal from the engine; always answers 200 |
//! | Status | `GET /api/v1/work/{correlation_key}` | Point read; 200 done, 202 pending, 404 unknown, 500 failed |
//! | List | `GET /api/v1/work` | Operational listing of live records |
//! | Health | `GET /health` | Store liveness probe |
//!
//! # Record Lifecycle
//!
//! ```text
//!          ┌─────────┐
//!          │ PENDING │  created by Begin (upsert, never a blind insert)
//!          └────┬────┘
//!               │ completion signal (exactly one wins)
//!        ┌──────┴──────┐
//!        ▼             ▼
//!   ┌────────┐    ┌────────┐
//!   │  DONE  │    │ ERROR  │   terminal: never reverts, payload frozen
//!   └────┬───┘    └────┬───┘
//!        └──────┬──────┘
//!               │ grace delay (~5 s), then deleted from the fast path
//!               ▼
//!           (removed; audit events remain)
//! ```
//!
//! A second signal for an already-terminal key is acknowledged and
//! ignored; the first terminal payload is retained. A signal arriving
//! before the Begin bookkeeping creates the record already terminal, and
//! the later upsert leaves it untouched.
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `ANTEROOM_DATABASE_URL` | Yes | - | PostgreSQL connection string |
//! | `ANTEROOM_ENGINE_URL` | Yes | - | Workflow engine trigger endpoint |
//! | `ANTEROOM_BIND_ADDR` | No | `0.0.0.0:8080` | HTTP listen address |
//! | `ANTEROOM_ENGINE_TIMEOUT_MS` | No | `10000` | Outbound trigger timeout |
//! | `ANTEROOM_WAIT_TIMEOUT_MS` | No | `25000` | Wait deadline per begin request |
//! | `ANTEROOM_POLL_FLOOR_MS` | No | `50` | First poll interval |
//! | `ANTEROOM_POLL_CAP_MS` | No | `1000` | Poll interval ceiling |
//! | `ANTEROOM_READ_TIMEOUT_MS` | No | `250` | Per-read store timeout |
//! | `ANTEROOM_CLEANUP_GRACE_MS` | No | `5000` | Delay before terminal records are deleted |
//! | `ANTEROOM_SWEEP_INTERVAL_SECS` | No | `60` | Background sweep period (0 disables) |
//! | `ANTEROOM_SWEEP_BATCH_SIZE` | No | `100` | Records deleted per sweep batch |
//! | `ANTEROOM_PENDING_MAX_AGE_SECS` | No | `86400` | Age before abandoned pending records are reaped |
//!
//! # Modules
//!
//! - [`config`]: Server configuration from environment variables
//! - [`persistence`]: State store trait with PostgreSQL and SQLite backends
//! - [`wait`]: Blocking wait-with-timeout over the store (geometric backoff)
//! - [`handlers`]: Begin / signal / status coordination logic
//! - [`engine`]: Outbound trigger seam to the workflow engine
//! - [`cleanup`]: Delayed per-key deletes and the background sweeper
//! - [`http`]: axum router and wire types
//! - [`error`]: Error types with stable error code mapping
//! - [`migrations`]: Embedded schema migrations

#![deny(missing_docs)]

/// Removal of work records after their grace delay.
pub mod cleanup;

/// Server configuration loaded from environment variables.
pub mod config;

/// Outbound trigger seam to the external workflow engine.
pub mod engine;

/// Error types for coordinator operations with stable error codes.
pub mod error;

/// Coordination handlers (begin, completion signal, status).
pub mod handlers;

/// HTTP boundary: axum router, wire types, error mapping.
pub mod http;

/// Embedded database migrations for both supported backends.
pub mod migrations;

/// State store trait and backend implementations.
pub mod persistence;

/// Blocking wait-with-timeout over the state store.
pub mod wait;
