//! Isolation runtime abstraction.
//!
//! The manager only ever talks to an [`IsolationRuntime`]; the production
//! implementation drives systemd transient units, tests substitute a
//! scripted one.

pub mod systemd;

use std::path::{Path, PathBuf};

use envbox_common::config::EnvboxConfig;
use envbox_common::types::{Namespace, ResourceRequest, UnitId};
use envbox_core::unit::RawStatus;

use crate::error::ManagerError;
use crate::termination::StepFailure;

/// Everything the runtime needs to start one execution attempt.
#[derive(Debug, Clone, Copy)]
pub struct LaunchSpec<'a> {
    /// Environment being launched.
    pub namespace: &'a Namespace,
    /// Shell command to run.
    pub command: &'a str,
    /// Resource envelope.
    pub resources: ResourceRequest,
    /// Working directory of the command.
    pub workdir: &'a Path,
    /// File receiving combined stdout and stderr.
    pub log_path: &'a Path,
}

/// Result of a successful launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launched {
    /// Handle of the new unit.
    pub unit: UnitId,
    /// Main pid, if it was resolved before the launch deadline.
    pub pid: Option<u32>,
    /// Where output is being written.
    pub log_path: PathBuf,
}

/// Outcome of the teardown escalation for one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerminationReport {
    /// Steps that failed; empty when teardown was clean.
    pub failures: Vec<StepFailure>,
}

impl TerminationReport {
    /// Returns whether every step succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A process supervisor able to run commands under resource limits.
pub trait IsolationRuntime: Send + Sync {
    /// Starts `spec.command` in a fresh unit.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::RuntimeUnavailable`] if the supervisor cannot
    /// be reached and [`ManagerError::LaunchFailed`] if it refuses the unit.
    fn launch(&self, spec: &LaunchSpec<'_>) -> Result<Launched, ManagerError>;

    /// Reads the unit's raw status; failures read as
    /// [`RawStatus::unreachable`].
    fn query(&self, unit: &UnitId) -> RawStatus;

    /// Looks up the unit's main pid once, without waiting.
    fn resolve_pid(&self, unit: &UnitId) -> Option<u32>;

    /// Stops the unit and its processes, escalating as needed.
    ///
    /// `pid` is only signalled directly while it is still a member of `unit`.
    fn terminate(&self, unit: &UnitId, pid: Option<u32>) -> TerminationReport;

    /// Returns whether the supervisor is usable on this host.
    fn is_available(&self) -> bool;
}

/// Creates the runtime for the current platform.
#[must_use]
pub fn detect_runtime(config: &EnvboxConfig) -> Box<dyn IsolationRuntime> {
    Box::new(systemd::SystemdRuntime::new(config))
}
