//! Termination protocol.
//!
//! Teardown is best effort: every step runs even if an earlier one failed,
//! and the environment is removed from the registry and store regardless.
//! Failed steps are collected and surfaced as
//! [`ManagerError::TerminationPartialFailure`].

use std::fmt;
use std::path::Path;

use envbox_common::types::{LifecycleState, Namespace, UnitId};
use serde::Serialize;

use crate::backend::IsolationRuntime;
use crate::error::ManagerError;
use crate::logs;
use crate::metrics::MetricsSampler;
use crate::registry::{Registry, lock};
use crate::store::Store;

/// One step of the teardown sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminationStep {
    /// Polite `SIGTERM` to every process in the unit.
    GracefulStop,
    /// `SIGKILL` to every process in the unit.
    ForcedKill,
    /// Unit stop request.
    Stop,
    /// Clearing the unit's failed state.
    ResetFailed,
    /// Direct `SIGKILL` to the recorded main pid, if it is still in the unit.
    SignalPid,
    /// Appending the final metric sample.
    RecordSample,
    /// Deleting the durable record.
    Persist,
    /// Removing the working directory.
    RemoveDirectory,
}

impl TerminationStep {
    /// Kebab-case name of the step.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GracefulStop => "graceful-stop",
            Self::ForcedKill => "forced-kill",
            Self::Stop => "stop",
            Self::ResetFailed => "reset-failed",
            Self::SignalPid => "signal-pid",
            Self::RecordSample => "record-sample",
            Self::Persist => "persist",
            Self::RemoveDirectory => "remove-directory",
        }
    }
}

impl fmt::Display for TerminationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A teardown step that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFailure {
    /// Which step failed.
    pub step: TerminationStep,
    /// Diagnostic detail.
    pub detail: String,
}

impl StepFailure {
    /// Creates a failure record.
    #[must_use]
    pub fn new(step: TerminationStep, detail: impl Into<String>) -> Self {
        Self {
            step,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.detail)
    }
}

/// Acknowledgement of a clean termination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TerminationAck {
    /// Environment that was terminated.
    pub namespace: Namespace,
    /// Unit that was torn down, if the environment was ever executed.
    pub unit: Option<UnitId>,
    /// Human-readable confirmation.
    pub message: String,
}

/// Collaborators the protocol needs, borrowed from the manager.
pub(crate) struct Termination<'a> {
    pub(crate) runtime: &'a dyn IsolationRuntime,
    pub(crate) registry: &'a Registry,
    pub(crate) store: &'a Store,
    pub(crate) environments_root: &'a Path,
    pub(crate) purge_metrics: bool,
}

impl Termination<'_> {
    /// Tears down `namespace` and forgets it.
    pub(crate) fn run(&self, namespace: &Namespace) -> Result<TerminationAck, ManagerError> {
        let slot = self.registry.get(namespace)?;
        let mut guard = lock(&slot);
        if guard.is_retired() {
            return Err(ManagerError::not_found(namespace));
        }

        let mut failures = Vec::new();
        let env = guard.env_mut();
        let unit = env.unit().cloned();
        if let Some(unit) = &unit {
            failures.extend(self.runtime.terminate(unit, env.main_pid()).failures);
        }

        env.mark_terminated();
        let sample = MetricsSampler::final_sample(
            namespace,
            LifecycleState::Terminated,
            env.main_pid(),
            env.last_sample_at(),
        );
        env.record_sample(&sample);
        if let Err(e) = self.store.append_sample(&sample, env.created_at()) {
            failures.push(StepFailure::new(TerminationStep::RecordSample, e.to_string()));
        }
        if self.purge_metrics {
            if let Err(e) = self.store.purge_samples(namespace) {
                failures.push(StepFailure::new(TerminationStep::Persist, e.to_string()));
            }
        }
        if let Err(e) = self.store.delete_environment(namespace) {
            failures.push(StepFailure::new(TerminationStep::Persist, e.to_string()));
        }
        self.registry.retire(namespace, &mut guard);

        match logs::remove_workdir(self.environments_root, namespace) {
            Ok(_) => {}
            Err(e) => failures.push(StepFailure::new(TerminationStep::RemoveDirectory, e.to_string())),
        }
        drop(guard);

        if failures.is_empty() {
            tracing::info!(namespace = %namespace, unit = ?unit, "environment terminated");
            Ok(TerminationAck {
                namespace: namespace.clone(),
                unit,
                message: format!("environment {namespace} terminated"),
            })
        } else {
            tracing::warn!(namespace = %namespace, failed_steps = failures.len(), "environment terminated with failures");
            Err(ManagerError::TerminationPartialFailure {
                namespace: namespace.clone(),
                failures,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_render_in_kebab_case() {
        assert_eq!(TerminationStep::GracefulStop.to_string(), "graceful-stop");
        assert_eq!(
            serde_json::to_value(TerminationStep::RemoveDirectory).unwrap(),
            "remove-directory"
        );
    }

    #[test]
    fn failures_serialize_with_step_and_detail() {
        let failure = StepFailure::new(TerminationStep::SignalPid, "EINVAL");
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["step"], "signal-pid");
        assert_eq!(json["detail"], "EINVAL");
        assert_eq!(failure.to_string(), "signal-pid: EINVAL");
    }
}
