//! Environment lifecycle management for envbox.
//!
//! The [`manager::EnvironmentManager`] ties together admission control, the
//! isolation runtime, status reconciliation, metrics sampling, and the
//! termination protocol over a lock-guarded registry backed by SQLite.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod admission;
pub mod backend;
pub mod environment;
pub mod error;
pub mod logs;
pub mod manager;
pub mod metrics;
pub mod reconcile;
pub mod registry;
pub mod store;
pub mod termination;
