//! The managed environment entity and its state transitions.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use envbox_common::types::{LifecycleState, Namespace, ResourceRequest, UnitId};
use envbox_core::unit::RawStatus;
use serde::Serialize;

use crate::backend::Launched;
use crate::metrics::{MetricSample, SampleSummary};
use crate::reconcile::reconcile;

/// A named environment: a command plus its resource envelope, and whatever
/// is known about the unit running it.
///
/// Fields are private so status only moves through [`Environment::reconcile`],
/// [`Environment::mark_launched`] and [`Environment::mark_terminated`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Environment {
    pub(crate) namespace: Namespace,
    pub(crate) command: String,
    #[serde(flatten)]
    pub(crate) resources: ResourceRequest,
    pub(crate) status: LifecycleState,
    pub(crate) unit: Option<UnitId>,
    pub(crate) main_pid: Option<u32>,
    pub(crate) log_path: Option<PathBuf>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) last_sample: Option<SampleSummary>,
}

impl Environment {
    /// Creates a new environment in the `created` state.
    #[must_use]
    pub fn new(namespace: Namespace, command: impl Into<String>, resources: ResourceRequest) -> Self {
        Self {
            namespace,
            command: command.into(),
            resources,
            status: LifecycleState::Created,
            unit: None,
            main_pid: None,
            log_path: None,
            created_at: Utc::now(),
            last_sample: None,
        }
    }

    /// Namespace identifying this environment.
    #[must_use]
    pub const fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Shell command run on execute.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Requested resources.
    #[must_use]
    pub const fn resources(&self) -> &ResourceRequest {
        &self.resources
    }

    /// Last known lifecycle state.
    #[must_use]
    pub const fn status(&self) -> LifecycleState {
        self.status
    }

    /// Unit of the current execution attempt.
    #[must_use]
    pub const fn unit(&self) -> Option<&UnitId> {
        self.unit.as_ref()
    }

    /// Main process id, once observed.
    #[must_use]
    pub const fn main_pid(&self) -> Option<u32> {
        self.main_pid
    }

    /// Output log of the current execution attempt.
    #[must_use]
    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Most recent metric sample taken for this environment.
    #[must_use]
    pub const fn last_sample(&self) -> Option<&SampleSummary> {
        self.last_sample.as_ref()
    }

    pub(crate) fn last_sample_at(&self) -> Option<DateTime<Utc>> {
        self.last_sample.as_ref().map(|s| s.timestamp)
    }

    /// Records a fresh execution attempt.
    ///
    /// The status is optimistically `running` until the next reconciliation.
    /// A pid from an earlier attempt belongs to a different unit and is
    /// replaced.
    pub fn mark_launched(&mut self, launched: &Launched) {
        self.unit = Some(launched.unit.clone());
        self.main_pid = launched.pid.filter(|p| *p != 0);
        self.log_path = Some(launched.log_path.clone());
        self.status = LifecycleState::Running;
    }

    /// Refines the status from a raw unit status and returns the new state.
    pub fn reconcile(&mut self, raw: &RawStatus) -> LifecycleState {
        self.observe_pid(raw.main_pid);
        self.status = reconcile(raw);
        self.status
    }

    /// Records a main pid; `None` and `0` never clear a known pid.
    pub fn observe_pid(&mut self, pid: Option<u32>) {
        if let Some(pid) = pid.filter(|p| *p != 0) {
            self.main_pid = Some(pid);
        }
    }

    /// Moves the environment to `terminated`.
    pub fn mark_terminated(&mut self) {
        self.status = LifecycleState::Terminated;
    }

    /// Remembers `sample` as the last known metrics.
    pub fn record_sample(&mut self, sample: &MetricSample) {
        self.last_sample = Some(SampleSummary::from(sample));
    }
}

#[cfg(test)]
mod tests {
    use envbox_core::unit::{ActiveState, LoadState, SubState, UnitResult};

    use super::*;

    fn env() -> Environment {
        Environment::new(
            Namespace::new("env").unwrap(),
            "sleep 1",
            ResourceRequest::default(),
        )
    }

    fn launched(pid: Option<u32>) -> Launched {
        Launched {
            unit: UnitId::new("envbox-env-0000abcd.service"),
            pid,
            log_path: PathBuf::from("/tmp/env/output.log"),
        }
    }

    fn running(pid: Option<u32>) -> RawStatus {
        RawStatus {
            load_state: LoadState::Loaded,
            active_state: ActiveState::Active,
            sub_state: SubState::Running,
            result: UnitResult::Success,
            exit_code: None,
            main_pid: pid,
        }
    }

    #[test]
    fn starts_created_without_unit() {
        let env = env();
        assert_eq!(env.status(), LifecycleState::Created);
        assert!(env.unit().is_none());
        assert!(env.main_pid().is_none());
    }

    #[test]
    fn launch_sets_handle_and_optimistic_status() {
        let mut env = env();
        env.mark_launched(&launched(Some(99)));
        assert_eq!(env.status(), LifecycleState::Running);
        assert_eq!(env.main_pid(), Some(99));
        assert_eq!(env.unit().unwrap().as_str(), "envbox-env-0000abcd.service");
    }

    #[test]
    fn known_pid_survives_empty_observations() {
        let mut env = env();
        env.mark_launched(&launched(Some(7)));
        env.observe_pid(None);
        env.observe_pid(Some(0));
        assert_eq!(env.reconcile(&RawStatus::not_found()), LifecycleState::Finished);
        assert_eq!(env.main_pid(), Some(7));
    }

    #[test]
    fn late_pid_is_picked_up_by_reconcile() {
        let mut env = env();
        env.mark_launched(&launched(None));
        assert_eq!(env.reconcile(&running(Some(31))), LifecycleState::Running);
        assert_eq!(env.main_pid(), Some(31));
    }

    #[test]
    fn terminated_is_explicit() {
        let mut env = env();
        env.mark_terminated();
        assert_eq!(env.status(), LifecycleState::Terminated);
    }

    #[test]
    fn serializes_flat_resources() {
        let json = serde_json::to_value(env()).unwrap();
        assert_eq!(json["namespace"], "env");
        assert_eq!(json["memory_mb"], 128);
        assert_eq!(json["status"], "created");
    }
}
