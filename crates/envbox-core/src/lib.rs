//! # envbox-core
//!
//! Host-level primitives for the envbox environment manager.
//!
//! This crate provides safe abstractions over:
//! - **Unit properties**: translating CPU, memory, and I/O budgets into the
//!   service manager's cgroup-backed resource controls.
//! - **Unit status**: parsing the service manager's free-form status output
//!   into closed enums at the boundary.
//! - **Commands**: running external tools with a hard deadline.
//! - **Signals**: delivering signals to processes that may already be gone.
//! - **Introspection**: host capacity and per-process resource counters.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod cgroup;
pub mod command;
pub mod host;
pub mod process;
pub mod signal;
pub mod unit;
