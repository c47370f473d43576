//! Environment manager: the public face of the runtime.
//!
//! Every operation is synchronous and may block (external commands, pid
//! polling, CPU sampling); async callers should run them on a blocking pool.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use envbox_common::config::EnvboxConfig;
use envbox_common::types::{LifecycleState, Namespace, ResourceRequest, UnitId};
use envbox_core::host::{HostCapacity, ResourceAdvisor, SysinfoAdvisor};
use envbox_core::process::{ProcessInspector, SysinfoInspector};
use envbox_core::unit::RawStatus;
use serde::Serialize;

use crate::admission;
use crate::backend::{self, IsolationRuntime, LaunchSpec};
use crate::environment::Environment;
use crate::error::ManagerError;
use crate::logs;
use crate::metrics::{MetricSample, MetricsSampler, SampleSummary};
use crate::reconcile::reconcile;
use crate::registry::{Registry, lock};
use crate::store::Store;
use crate::termination::{Termination, TerminationAck};

/// Parameters of a new environment.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateRequest {
    /// Unique name.
    pub namespace: Namespace,
    /// Shell command to run on execute.
    pub command: String,
    /// Resource envelope.
    pub resources: ResourceRequest,
}

/// Returned when an execution attempt has been started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionHandle {
    /// Confirmation message.
    pub message: String,
    /// Environment that was executed.
    pub namespace: Namespace,
    /// Unit running the command.
    pub unit: UnitId,
    /// Log receiving the command's output.
    pub output_path: PathBuf,
    /// Main pid, if already known.
    pub pid: Option<u32>,
}

/// Result of a status query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    /// The environment after reconciliation.
    #[serde(flatten)]
    pub environment: Environment,
    /// Raw unit status the state was derived from, when a unit exists.
    pub runtime: Option<RawStatus>,
}

/// One row of [`EnvironmentManager::list`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvironmentSummary {
    /// Environment name.
    pub namespace: Namespace,
    /// Last known state.
    pub status: LifecycleState,
    /// Command run on execute.
    pub command: String,
    /// Requested resources.
    #[serde(flatten)]
    pub resources: ResourceRequest,
    /// Current unit, if executed.
    pub unit: Option<UnitId>,
    /// Main pid, if observed.
    pub main_pid: Option<u32>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Most recent metric sample.
    pub last_sample: Option<SampleSummary>,
}

/// Owns the registry, store and runtime, and implements every lifecycle
/// operation on top of them.
pub struct EnvironmentManager {
    config: EnvboxConfig,
    store: Arc<Store>,
    registry: Registry,
    runtime: Box<dyn IsolationRuntime>,
    advisor: Box<dyn ResourceAdvisor>,
    sampler: MetricsSampler,
}

impl EnvironmentManager {
    /// Opens the manager with production collaborators: the SQLite store at
    /// `config.db_path`, systemd, and live host counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the store cannot
    /// be opened.
    pub fn open(config: EnvboxConfig) -> Result<Self, ManagerError> {
        config.validate()?;
        let store = Arc::new(Store::open(&config.db_path)?);
        let runtime = backend::detect_runtime(&config);
        if !runtime.is_available() {
            tracing::warn!("isolation runtime not available; execute will fail");
        }
        let inspector = Arc::new(SysinfoInspector::new(config.cpu_sample_interval()));
        Ok(Self::with_parts(
            config,
            store,
            runtime,
            Box::new(SysinfoAdvisor::new()),
            inspector,
        ))
    }

    /// Assembles a manager from explicit collaborators.
    #[must_use]
    pub fn with_parts(
        config: EnvboxConfig,
        store: Arc<Store>,
        runtime: Box<dyn IsolationRuntime>,
        advisor: Box<dyn ResourceAdvisor>,
        inspector: Arc<dyn ProcessInspector>,
    ) -> Self {
        Self {
            registry: Registry::new(Arc::clone(&store)),
            config,
            store,
            runtime,
            advisor,
            sampler: MetricsSampler::new(inspector),
        }
    }

    /// Service configuration.
    #[must_use]
    pub const fn config(&self) -> &EnvboxConfig {
        &self.config
    }

    /// Whether the isolation runtime can launch units on this host.
    #[must_use]
    pub fn runtime_available(&self) -> bool {
        self.runtime.is_available()
    }

    /// Registers a new environment after admission control.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Admission`] if the request is invalid, the
    /// namespace is taken, or the host lacks capacity. Nothing is registered
    /// in that case.
    pub fn create(&self, request: CreateRequest) -> Result<Environment, ManagerError> {
        let CreateRequest {
            namespace,
            command,
            resources,
        } = request;
        let env = Environment::new(namespace.clone(), command, resources);
        let slot = self.registry.register(env, |exists| {
            admission::admit(&namespace, &resources, self.advisor.as_ref(), exists)
        })?;
        let env = lock(&slot).env().clone();
        tracing::info!(
            namespace = %namespace,
            cpu = resources.cpu,
            memory_mb = resources.memory_mb,
            "environment created"
        );
        Ok(env)
    }

    /// Starts the environment's command in a fresh unit.
    ///
    /// A previous unit is torn down first unless it is known to have
    /// finished or failed.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::NotFound`] for an unknown namespace and
    /// [`ManagerError::RuntimeUnavailable`] / [`ManagerError::LaunchFailed`]
    /// if the unit cannot be started; the environment then keeps its
    /// previous state.
    pub fn execute(&self, namespace: &Namespace) -> Result<ExecutionHandle, ManagerError> {
        let slot = self.registry.get(namespace)?;
        let mut guard = lock(&slot);
        if guard.is_retired() {
            return Err(ManagerError::not_found(namespace));
        }
        let env = guard.env_mut();

        if let Some(previous) = env.unit().cloned() {
            // An unreadable unit may still be running, so only a unit known to
            // be gone or stopped is left alone.
            let state = reconcile(&self.runtime.query(&previous));
            if !matches!(state, LifecycleState::Finished | LifecycleState::Error) {
                tracing::warn!(namespace = %namespace, unit = %previous, %state, "replacing unit that may still be running");
                let report = self.runtime.terminate(&previous, env.main_pid());
                for failure in &report.failures {
                    tracing::warn!(unit = %previous, %failure, "teardown of replaced unit incomplete");
                }
            }
        }

        let root = self.config.environments_dir();
        let workdir = logs::workdir(&root, namespace);
        let log_path = logs::log_path(&root, namespace);
        let launched = self.runtime.launch(&LaunchSpec {
            namespace,
            command: env.command(),
            resources: *env.resources(),
            workdir: &workdir,
            log_path: &log_path,
        })?;

        env.mark_launched(&launched);
        self.store.save_environment(env)?;
        tracing::info!(namespace = %namespace, unit = %launched.unit, pid = ?launched.pid, "environment executing");

        Ok(ExecutionHandle {
            message: format!("environment {namespace} started"),
            namespace: namespace.clone(),
            unit: launched.unit,
            output_path: launched.log_path,
            pid: launched.pid,
        })
    }

    /// Reconciles the environment against its unit and takes a metric
    /// sample.
    ///
    /// Persisting the refreshed state and sample is best effort.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::NotFound`] for an unknown namespace.
    pub fn status(&self, namespace: &Namespace) -> Result<StatusReport, ManagerError> {
        let slot = self.registry.get(namespace)?;
        let mut guard = lock(&slot);
        if guard.is_retired() {
            return Err(ManagerError::not_found(namespace));
        }
        let env = guard.env_mut();

        let Some(unit) = env.unit().cloned() else {
            return Ok(StatusReport {
                environment: env.clone(),
                runtime: None,
            });
        };

        let raw = self.runtime.query(&unit);
        let state = env.reconcile(&raw);
        if env.main_pid().is_none() && state.is_active() {
            env.observe_pid(self.runtime.resolve_pid(&unit));
        }

        if let Some(pid) = env.main_pid() {
            let sample = self
                .sampler
                .sample(namespace, state, Some(pid), env.last_sample_at());
            if let Err(e) = self.store.append_sample(&sample, env.created_at()) {
                tracing::warn!(namespace = %namespace, error = %e, "failed to record sample");
            }
            env.record_sample(&sample);
        }
        if let Err(e) = self.store.save_environment(env) {
            tracing::warn!(namespace = %namespace, error = %e, "failed to persist status");
        }
        tracing::debug!(namespace = %namespace, unit = %unit, status = %state, "status reconciled");

        Ok(StatusReport {
            environment: env.clone(),
            runtime: Some(raw),
        })
    }

    /// Lists every environment with its most recent metric sample.
    ///
    /// States are the last known ones; no unit is queried.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn list(&self) -> Result<Vec<EnvironmentSummary>, ManagerError> {
        // Slots first: a row deleted by a concurrent terminate is then either
        // already gone from the store or shadowed by its retired slot.
        let mut resident = Vec::new();
        let mut retired = HashSet::new();
        for slot in self.registry.resident() {
            let guard = lock(&slot);
            if guard.is_retired() {
                let _ = retired.insert(guard.env().namespace().clone());
            } else {
                resident.push(guard.env().clone());
            }
        }
        let envs = merge_listing(resident, &retired, self.store.list_environments()?);

        let mut latest = self.store.latest_samples()?;
        let mut summaries: Vec<_> = envs
            .into_iter()
            .map(|env| {
                let last_sample = latest
                    .remove(env.namespace())
                    .map(|s| SampleSummary::from(&s))
                    .or_else(|| env.last_sample().cloned());
                EnvironmentSummary {
                    namespace: env.namespace().clone(),
                    status: env.status(),
                    command: env.command().to_string(),
                    resources: *env.resources(),
                    unit: env.unit().cloned(),
                    main_pid: env.main_pid(),
                    created_at: env.created_at(),
                    last_sample,
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.namespace.cmp(&b.namespace));
        Ok(summaries)
    }

    /// Returns the path of the environment's output log.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::NotFound`] if no log exists.
    pub fn output_path(&self, namespace: &Namespace) -> Result<PathBuf, ManagerError> {
        let path = logs::log_path(&self.config.environments_dir(), namespace);
        if path.is_file() {
            Ok(path)
        } else {
            Err(ManagerError::not_found(namespace))
        }
    }

    /// Reads the environment's output log.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::NotFound`] if no log exists, or an I/O error.
    pub fn read_output(&self, namespace: &Namespace) -> Result<String, ManagerError> {
        logs::read_output(&self.config.environments_dir(), namespace)?
            .ok_or_else(|| ManagerError::not_found(namespace))
    }

    /// Returns the recorded metric history, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn samples(&self, namespace: &Namespace) -> Result<Vec<MetricSample>, ManagerError> {
        Ok(self.store.samples(namespace)?)
    }

    /// Tears the environment down and forgets it.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::NotFound`] for an unknown namespace and
    /// [`ManagerError::TerminationPartialFailure`] if some teardown step
    /// failed; the environment is gone in both success and partial failure.
    pub fn terminate(&self, namespace: &Namespace) -> Result<TerminationAck, ManagerError> {
        let root = self.config.environments_dir();
        Termination {
            runtime: self.runtime.as_ref(),
            registry: &self.registry,
            store: &self.store,
            environments_root: &root,
            purge_metrics: self.config.purge_metrics_on_terminate,
        }
        .run(namespace)
    }

    /// Current host capacity.
    #[must_use]
    pub fn resources(&self) -> HostCapacity {
        self.advisor.capacity()
    }

    /// Number of environments currently cached in memory.
    #[must_use]
    pub fn resident_count(&self) -> usize {
        self.registry.len()
    }
}

/// Combines resident environments with stored rows, preferring the resident
/// copy and dropping rows whose slot was retired.
fn merge_listing(
    resident: Vec<Environment>,
    retired: &HashSet<Namespace>,
    stored: Vec<Environment>,
) -> Vec<Environment> {
    let mut envs: HashMap<Namespace, Environment> = resident
        .into_iter()
        .map(|env| (env.namespace().clone(), env))
        .collect();
    for env in stored {
        if !retired.contains(env.namespace()) && !envs.contains_key(env.namespace()) {
            let _ = envs.insert(env.namespace().clone(), env);
        }
    }
    envs.into_values().collect()
}

impl std::fmt::Debug for EnvironmentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentManager")
            .field("data_dir", &self.config.data_dir)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(name: &str, command: &str) -> Environment {
        Environment::new(Namespace::new(name).unwrap(), command, ResourceRequest::default())
    }

    fn names(mut envs: Vec<Environment>) -> Vec<String> {
        envs.sort_by(|a, b| a.namespace().cmp(b.namespace()));
        envs.iter().map(|e| e.namespace().to_string()).collect()
    }

    #[test]
    fn retired_slot_hides_its_stale_row() {
        let retired = HashSet::from([Namespace::new("gone").unwrap()]);
        let merged = merge_listing(
            vec![env("live", "true")],
            &retired,
            vec![env("gone", "true"), env("cold", "true")],
        );
        assert_eq!(names(merged), ["cold", "live"]);
    }

    #[test]
    fn resident_copy_wins_over_stored_row() {
        let merged = merge_listing(
            vec![env("a", "resident")],
            &HashSet::new(),
            vec![env("a", "stored")],
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].command(), "resident");
    }
}
