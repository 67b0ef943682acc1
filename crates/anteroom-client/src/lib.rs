// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client SDK for the anteroom correlation completion coordinator.
//!
//! This crate provides a high-level client for coordinating units of work:
//! - Begin a unit of work and block until it completes
//! - Signal completion or failure on behalf of a workflow engine
//! - Poll work status past the coordinator's wait deadline
//!
//! # Example
//!
//! ```no_run
//! use anteroom_client::{AnteroomClient, BeginOptions, BeginOutcome, ClientConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = AnteroomClient::new(ClientConfig::from_env()?)?;
//!
//!     let options = BeginOptions::new("order-1001", "order-sync")
//!         .with_inputs(serde_json::json!({"order_id": 1001}));
//!
//!     match client.begin(options).await? {
//!         BeginOutcome::Completed(result) => println!("Result: {}", result),
//!         BeginOutcome::Failed(info) => println!("Work failed: {:?}", info.error),
//!         BeginOutcome::Accepted(handle) => {
//!             let info = client
//!                 .wait_until_terminal(&handle.correlation_key, Duration::from_secs(300))
//!                 .await?;
//!             println!("Finished with status {:?}", info.status);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod error;
mod types;

pub use client::AnteroomClient;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use types::{BeginOptions, BeginOutcome, SignalReceipt, WorkHandle, WorkInfo, WorkState};
