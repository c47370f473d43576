//! Raw isolation-unit status.
//!
//! The service manager reports unit state as free-form `Key=Value` lines.
//! They are parsed here, at the boundary, into small closed enums so that
//! nothing downstream ever matches on raw strings.

use serde::Serialize;

/// Properties requested from the service manager for a status query.
pub const STATUS_PROPERTIES: &str = "LoadState,ActiveState,SubState,Result,ExecMainStatus,MainPID";

/// Whether the unit definition is known to the service manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadState {
    /// The unit is loaded.
    Loaded,
    /// The unit does not exist (never created, or garbage-collected).
    NotFound,
    /// The unit is masked.
    Masked,
    /// The unit failed to load or has a bad setting.
    Error,
    /// Anything else, including an unreachable service manager.
    Other,
}

impl LoadState {
    fn parse(value: &str) -> Self {
        match value {
            "loaded" => Self::Loaded,
            "not-found" => Self::NotFound,
            "masked" => Self::Masked,
            "error" | "bad-setting" => Self::Error,
            _ => Self::Other,
        }
    }
}

/// High-level activation state of the unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActiveState {
    /// Started and running.
    Active,
    /// Reloading its configuration while active.
    Reloading,
    /// Not running.
    Inactive,
    /// Not running after a failure.
    Failed,
    /// Being started.
    Activating,
    /// Being stopped.
    Deactivating,
    /// Anything else.
    Other,
}

impl ActiveState {
    fn parse(value: &str) -> Self {
        match value {
            "active" => Self::Active,
            "reloading" => Self::Reloading,
            "inactive" => Self::Inactive,
            "failed" => Self::Failed,
            "activating" => Self::Activating,
            "deactivating" => Self::Deactivating,
            _ => Self::Other,
        }
    }
}

/// Unit-type specific sub-state; only the values envbox acts on are named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubState {
    /// The main process is running.
    Running,
    /// The main process exited and the unit is still up.
    Exited,
    /// The unit is stopped.
    Dead,
    /// The unit failed.
    Failed,
    /// Anything else.
    Other,
}

impl SubState {
    fn parse(value: &str) -> Self {
        match value {
            "running" => Self::Running,
            "exited" => Self::Exited,
            "dead" => Self::Dead,
            "failed" => Self::Failed,
            _ => Self::Other,
        }
    }
}

/// Outcome of the unit's last run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnitResult {
    /// Exited cleanly.
    Success,
    /// The main process exited with a non-zero code.
    ExitCode,
    /// The main process was killed by a signal.
    Signal,
    /// The main process dumped core.
    CoreDump,
    /// A start or stop timeout fired.
    Timeout,
    /// The kernel OOM killer fired inside the unit.
    OomKill,
    /// Anything else.
    Other,
}

impl UnitResult {
    fn parse(value: &str) -> Self {
        match value {
            "success" => Self::Success,
            "exit-code" => Self::ExitCode,
            "signal" => Self::Signal,
            "core-dump" => Self::CoreDump,
            "timeout" => Self::Timeout,
            "oom-kill" => Self::OomKill,
            _ => Self::Other,
        }
    }
}

/// Parsed status of one isolation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RawStatus {
    /// Whether the unit is known.
    pub load_state: LoadState,
    /// Activation state.
    pub active_state: ActiveState,
    /// Unit-type specific state.
    pub sub_state: SubState,
    /// Result of the last run.
    pub result: UnitResult,
    /// Exit status of the main process, when one was recorded.
    pub exit_code: Option<i32>,
    /// Main process id, absent when the manager reports none.
    pub main_pid: Option<u32>,
}

impl RawStatus {
    /// Status reported when the service manager could not be consulted.
    ///
    /// Every field is `Other`/absent, which reconciles to `unknown`.
    #[must_use]
    pub const fn unreachable() -> Self {
        Self {
            load_state: LoadState::Other,
            active_state: ActiveState::Other,
            sub_state: SubState::Other,
            result: UnitResult::Other,
            exit_code: None,
            main_pid: None,
        }
    }

    /// Status of a unit the service manager does not know.
    #[must_use]
    pub const fn not_found() -> Self {
        Self {
            load_state: LoadState::NotFound,
            active_state: ActiveState::Inactive,
            sub_state: SubState::Dead,
            result: UnitResult::Success,
            exit_code: None,
            main_pid: None,
        }
    }

    /// Parses `Key=Value` lines as printed by `systemctl show`.
    ///
    /// Unknown keys are ignored and missing keys keep their
    /// [`RawStatus::unreachable`] value. `ExecMainStatus` is only reported
    /// as an exit code when it parses; `MainPID=0` means no main process.
    #[must_use]
    pub fn parse(output: &str) -> Self {
        let mut status = Self::unreachable();
        for line in output.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "LoadState" => status.load_state = LoadState::parse(value),
                "ActiveState" => status.active_state = ActiveState::parse(value),
                "SubState" => status.sub_state = SubState::parse(value),
                "Result" => status.result = UnitResult::parse(value),
                "ExecMainStatus" => status.exit_code = value.parse().ok(),
                "MainPID" => status.main_pid = parse_pid(value),
                _ => {}
            }
        }
        status
    }
}

/// Parses a main-pid value, mapping `0` and garbage to `None`.
#[must_use]
pub fn parse_pid(value: &str) -> Option<u32> {
    value.trim().parse::<u32>().ok().filter(|pid| *pid != 0)
}
