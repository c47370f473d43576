//! Isolation runtime backed by systemd transient service units.
//!
//! Commands run as `/bin/sh -c <command>` inside a unit created with
//! `systemd-run`; limits are unit properties (`CPUQuota`, `MemoryMax`,
//! `IOWeight`) so the kernel enforces them through cgroups v2.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use envbox_common::config::EnvboxConfig;
use envbox_common::constants::UNIT_PREFIX;
use envbox_common::error::EnvboxError;
use envbox_common::types::{Namespace, UnitId};
use envbox_core::cgroup::UnitProperties;
use envbox_core::command::{CommandOutput, run_with_timeout};
use envbox_core::process::belongs_to_unit;
use envbox_core::signal::{Signal, SignalOutcome, send_signal};
use envbox_core::unit::{RawStatus, STATUS_PROPERTIES, parse_pid};

use super::{IsolationRuntime, LaunchSpec, Launched, TerminationReport};
use crate::error::ManagerError;
use crate::logs;
use crate::termination::{StepFailure, TerminationStep};

const SYSTEMD_RUN: &str = "systemd-run";
const SYSTEMCTL: &str = "systemctl";

/// Runtime that launches each execution as a transient systemd service.
#[derive(Debug, Clone)]
pub struct SystemdRuntime {
    user_mode: bool,
    collect: bool,
    command_timeout: Duration,
    pid_timeout: Duration,
    pid_poll: Duration,
    stop_grace: Duration,
}

impl SystemdRuntime {
    /// Creates a runtime from the service configuration.
    #[must_use]
    pub fn new(config: &EnvboxConfig) -> Self {
        Self {
            user_mode: config.user_mode,
            collect: config.collect_units,
            command_timeout: config.command_timeout(),
            pid_timeout: config.pid_resolve_timeout(),
            pid_poll: config.pid_poll_interval(),
            stop_grace: config.stop_grace(),
        }
    }

    /// Builds the `systemd-run` argument list for one launch.
    #[must_use]
    pub fn run_args(&self, unit: &UnitId, spec: &LaunchSpec<'_>) -> Vec<String> {
        let mut args = Vec::new();
        if self.user_mode {
            args.push("--user".to_string());
        }
        args.push(format!("--unit={unit}"));
        args.push("--quiet".to_string());
        if self.collect {
            args.push("--collect".to_string());
        }
        args.push(format!("--working-directory={}", spec.workdir.display()));

        let log = spec.log_path.display();
        args.extend(
            UnitProperties::from_request(&spec.resources)
                .with(format!("StandardOutput=append:{log}"))
                .with(format!("StandardError=append:{log}"))
                .to_args(),
        );

        args.extend([
            "/bin/sh".to_string(),
            "-c".to_string(),
            spec.command.to_string(),
        ]);
        args
    }

    fn systemctl(&self, args: &[&str]) -> Result<CommandOutput, String> {
        let mut command = Command::new(SYSTEMCTL);
        if self.user_mode {
            let _ = command.arg("--user");
        }
        let _ = command.args(args);
        run_with_timeout(&mut command, self.command_timeout).map_err(|e| e.to_string())
    }

    fn wait_for_pid(&self, unit: &UnitId) -> Option<u32> {
        let deadline = Instant::now() + self.pid_timeout;
        loop {
            if let Some(pid) = self.resolve_pid(unit) {
                return Some(pid);
            }
            if Instant::now() >= deadline {
                tracing::debug!(unit = %unit, "main pid not resolved before deadline");
                return None;
            }
            std::thread::sleep(self.pid_poll);
        }
    }

    fn step(&self, failures: &mut Vec<StepFailure>, step: TerminationStep, args: &[&str]) {
        match self.systemctl(args) {
            Ok(out) if out.success() || unit_is_gone(&out.stderr) => {}
            Ok(out) => {
                let detail = format!("exit {:?}: {}", out.exit_code, out.stderr.trim());
                tracing::warn!(%step, %detail, "teardown step failed");
                failures.push(StepFailure::new(step, detail));
            }
            Err(detail) => {
                tracing::warn!(%step, %detail, "teardown step failed");
                failures.push(StepFailure::new(step, detail));
            }
        }
    }
}

impl IsolationRuntime for SystemdRuntime {
    fn launch(&self, spec: &LaunchSpec<'_>) -> Result<Launched, ManagerError> {
        if !self.is_available() {
            return Err(ManagerError::RuntimeUnavailable {
                message: format!("{SYSTEMD_RUN} not found on PATH"),
            });
        }

        logs::prepare_output(spec.workdir, spec.log_path)?;
        let workdir = absolute(spec.workdir)?;
        let log_path = absolute(spec.log_path)?;
        let resolved = LaunchSpec {
            workdir: &workdir,
            log_path: &log_path,
            ..*spec
        };

        let unit = unit_name(spec.namespace);
        let args = self.run_args(&unit, &resolved);
        tracing::info!(namespace = %spec.namespace, unit = %unit, "launching transient unit");

        let out = run_with_timeout(Command::new(SYSTEMD_RUN).args(&args), self.command_timeout)
            .map_err(|e| ManagerError::RuntimeUnavailable {
                message: e.to_string(),
            })?;
        if !out.success() {
            return Err(ManagerError::LaunchFailed {
                namespace: spec.namespace.clone(),
                message: format!(
                    "{SYSTEMD_RUN} exited with {:?}: {}",
                    out.exit_code,
                    out.stderr.trim()
                ),
            });
        }

        let pid = self.wait_for_pid(&unit);
        tracing::info!(namespace = %spec.namespace, unit = %unit, ?pid, "unit started");
        Ok(Launched {
            unit,
            pid,
            log_path: spec.log_path.to_path_buf(),
        })
    }

    fn query(&self, unit: &UnitId) -> RawStatus {
        let property = format!("--property={STATUS_PROPERTIES}");
        match self.systemctl(&["show", unit.as_str(), &property, "--no-pager"]) {
            Ok(out) if out.success() => RawStatus::parse(&out.stdout),
            Ok(out) => {
                tracing::warn!(unit = %unit, stderr = %out.stderr.trim(), "status query failed");
                RawStatus::unreachable()
            }
            Err(e) => {
                tracing::warn!(unit = %unit, error = %e, "status query failed");
                RawStatus::unreachable()
            }
        }
    }

    fn resolve_pid(&self, unit: &UnitId) -> Option<u32> {
        let out = self
            .systemctl(&["show", unit.as_str(), "--property=MainPID", "--value"])
            .ok()?;
        if out.success() { parse_pid(&out.stdout) } else { None }
    }

    fn terminate(&self, unit: &UnitId, pid: Option<u32>) -> TerminationReport {
        let name = unit.as_str();
        let mut failures = Vec::new();
        tracing::info!(unit = %unit, ?pid, "tearing down unit");

        self.step(
            &mut failures,
            TerminationStep::GracefulStop,
            &["kill", "--signal=SIGTERM", name],
        );
        std::thread::sleep(self.stop_grace);
        self.step(
            &mut failures,
            TerminationStep::ForcedKill,
            &["kill", "--signal=SIGKILL", name],
        );
        self.step(&mut failures, TerminationStep::Stop, &["stop", name]);
        self.step(&mut failures, TerminationStep::ResetFailed, &["reset-failed", name]);

        match pid {
            Some(pid) if belongs_to_unit(pid, name) => match send_signal(pid, Signal::SIGKILL) {
                Ok(SignalOutcome::Delivered) => {
                    tracing::warn!(unit = %unit, pid, "main process outlived its unit, killed");
                }
                Ok(SignalOutcome::NoSuchProcess | SignalOutcome::NotPermitted) => {}
                Err(e) => failures.push(StepFailure::new(TerminationStep::SignalPid, e.to_string())),
            },
            Some(pid) => tracing::debug!(unit = %unit, pid, "pid no longer in unit, not signalled"),
            None => {}
        }

        TerminationReport { failures }
    }

    fn is_available(&self) -> bool {
        which::which(SYSTEMD_RUN).is_ok() && which::which(SYSTEMCTL).is_ok()
    }
}

/// Returns a fresh unit name for `namespace`.
///
/// A random suffix keeps every execution attempt on its own unit.
#[must_use]
pub fn unit_name(namespace: &Namespace) -> UnitId {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    UnitId::new(format!("{UNIT_PREFIX}-{namespace}-{}.service", &suffix[..8]))
}

/// Returns whether systemctl's diagnostic says the unit no longer exists.
fn unit_is_gone(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    ["not loaded", "not found", "no such", "does not exist", "no processes to kill"]
        .iter()
        .any(|needle| stderr.contains(needle))
}

/// systemd rejects relative working directories and `append:` targets.
fn absolute(path: &Path) -> Result<PathBuf, ManagerError> {
    std::path::absolute(path).map_err(|source| {
        ManagerError::Common(EnvboxError::Io {
            path: path.to_path_buf(),
            source,
        })
    })
}

#[cfg(test)]
mod tests {
    use envbox_common::types::ResourceRequest;

    use super::*;

    fn runtime(user_mode: bool, collect: bool) -> SystemdRuntime {
        let config = EnvboxConfig {
            user_mode,
            collect_units: collect,
            ..EnvboxConfig::default()
        };
        SystemdRuntime::new(&config)
    }

    fn ns(name: &str) -> Namespace {
        Namespace::new(name).unwrap()
    }

    #[test]
    fn unit_names_are_fresh_and_well_formed() {
        let a = unit_name(&ns("web"));
        let b = unit_name(&ns("web"));
        assert_ne!(a, b);
        let name = a.as_str();
        assert!(name.starts_with("envbox-web-"));
        assert!(name.ends_with(".service"));
        assert_eq!(name.len(), "envbox-web-".len() + 8 + ".service".len());
    }

    #[test]
    fn run_args_carry_limits_and_redirection() {
        let namespace = ns("job");
        let workdir = PathBuf::from("/data/environments/job");
        let log = workdir.join("output.log");
        let spec = LaunchSpec {
            namespace: &namespace,
            command: "echo hi && sleep 1",
            resources: ResourceRequest {
                cpu: 1.5,
                memory_mb: 256,
                io_weight: 50,
            },
            workdir: &workdir,
            log_path: &log,
        };
        let unit = UnitId::new("envbox-job-deadbeef.service");
        let args = runtime(false, true).run_args(&unit, &spec);

        assert_eq!(args[0], "--unit=envbox-job-deadbeef.service");
        assert!(args.contains(&"--quiet".to_string()));
        assert!(args.contains(&"--collect".to_string()));
        assert!(args.contains(&"--working-directory=/data/environments/job".to_string()));
        assert!(args.contains(&"--property=CPUQuota=150%".to_string()));
        assert!(args.contains(&"--property=MemoryMax=256M".to_string()));
        assert!(args.contains(&"--property=IOWeight=50".to_string()));
        assert!(args.contains(
            &"--property=StandardOutput=append:/data/environments/job/output.log".to_string()
        ));
        assert!(args.contains(
            &"--property=StandardError=append:/data/environments/job/output.log".to_string()
        ));
        assert!(!args.contains(&"--user".to_string()));
        assert_eq!(
            &args[args.len() - 3..],
            ["/bin/sh", "-c", "echo hi && sleep 1"]
        );
    }

    #[test]
    fn user_mode_is_first_flag() {
        let namespace = ns("u");
        let path = PathBuf::from("/tmp/u");
        let spec = LaunchSpec {
            namespace: &namespace,
            command: "",
            resources: ResourceRequest::default(),
            workdir: &path,
            log_path: &path,
        };
        let args = runtime(true, false).run_args(&UnitId::new("x.service"), &spec);
        assert_eq!(args[0], "--user");
        assert!(!args.contains(&"--collect".to_string()));
    }

    #[test]
    fn gone_units_are_recognised() {
        assert!(unit_is_gone("Failed to kill unit x.service: Unit x.service not loaded."));
        assert!(unit_is_gone("Unit x.service not found."));
        assert!(!unit_is_gone("Access denied"));
    }

    #[test]
    fn relative_paths_are_made_absolute() {
        let resolved = absolute(Path::new("relative/x")).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("relative/x"));
    }

    #[test]
    fn teardown_spares_a_process_outside_the_unit() {
        let config = EnvboxConfig {
            stop_grace_ms: 10,
            command_timeout_ms: 2_000,
            ..EnvboxConfig::default()
        };
        let mut bystander = std::process::Command::new("/bin/sleep")
            .arg("30")
            .spawn()
            .unwrap();

        let _ = SystemdRuntime::new(&config).terminate(
            &UnitId::new("envbox-gone-00000000.service"),
            Some(bystander.id()),
        );

        let still_running = bystander.try_wait().unwrap().is_none();
        let _ = bystander.kill();
        let _ = bystander.wait();
        assert!(still_running, "unrelated process was killed");
    }

    #[test]
    #[ignore = "requires a running systemd and permission to create units"]
    fn live_unit_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime(true, true);
        let namespace = ns("live-test");
        let workdir = logs::workdir(dir.path(), &namespace);
        let log = logs::log_path(dir.path(), &namespace);
        let launched = rt
            .launch(&LaunchSpec {
                namespace: &namespace,
                command: "echo started; sleep 1",
                resources: ResourceRequest::default(),
                workdir: &workdir,
                log_path: &log,
            })
            .unwrap();
        assert!(launched.log_path.exists());

        let report = rt.terminate(&launched.unit, launched.pid);
        assert!(report.is_clean(), "{report:?}");
    }
}
