//! Global configuration model for envbox.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EnvboxError, Result};

/// Root configuration for the environment manager and its HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvboxConfig {
    /// Base directory for envbox state and per-namespace working directories.
    pub data_dir: PathBuf,
    /// Path to the SQLite database, `<data_dir>/envbox.db` by default.
    pub db_path: PathBuf,
    /// Address the HTTP surface binds to.
    pub bind: String,
    /// Drive the per-user service manager (`--user`) instead of the system one.
    pub user_mode: bool,
    /// Ask the runtime to garbage-collect units even after they failed.
    pub collect_units: bool,
    /// Upper bound on any single external runtime invocation.
    pub command_timeout_ms: u64,
    /// How long `launch` polls for the main pid before giving up.
    pub pid_resolve_timeout_ms: u64,
    /// Poll interval while resolving the main pid.
    pub pid_poll_interval_ms: u64,
    /// Grace period between the graceful and forced stop signals.
    pub stop_grace_ms: u64,
    /// Interval between the two process reads that yield a CPU percentage.
    pub cpu_sample_interval_ms: u64,
    /// Delete a namespace's metric history when it is terminated.
    pub purge_metrics_on_terminate: bool,
}

impl Default for EnvboxConfig {
    fn default() -> Self {
        let data_dir = crate::constants::data_dir().clone();
        Self::with_data_dir(data_dir)
    }
}

impl EnvboxConfig {
    /// Builds the default configuration rooted at `data_dir`.
    #[must_use]
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            db_path: data_dir.join(crate::constants::DATABASE_FILE),
            data_dir,
            bind: crate::constants::DEFAULT_BIND.to_string(),
            user_mode: false,
            collect_units: false,
            command_timeout_ms: 5_000,
            pid_resolve_timeout_ms: 2_000,
            pid_poll_interval_ms: 100,
            stop_grace_ms: 500,
            cpu_sample_interval_ms: 50,
            purge_metrics_on_terminate: false,
        }
    }

    /// Directory that holds one working directory per namespace.
    #[must_use]
    pub fn environments_dir(&self) -> PathBuf {
        self.data_dir.join(crate::constants::ENVIRONMENTS_DIR)
    }

    /// Timeout applied to external runtime invocations.
    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Deadline for main-pid resolution at launch.
    #[must_use]
    pub const fn pid_resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.pid_resolve_timeout_ms)
    }

    /// Poll interval for main-pid resolution.
    #[must_use]
    pub const fn pid_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pid_poll_interval_ms)
    }

    /// Grace period between graceful and forced stop.
    #[must_use]
    pub const fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    /// CPU sampling interval.
    #[must_use]
    pub const fn cpu_sample_interval(&self) -> Duration {
        Duration::from_millis(self.cpu_sample_interval_ms)
    }

    /// Checks that every timing knob is usable.
    ///
    /// # Errors
    ///
    /// Returns [`EnvboxError::Config`] if a timeout or interval is zero, or
    /// the poll interval exceeds the resolve deadline.
    pub fn validate(&self) -> Result<()> {
        let zero = [
            ("command_timeout_ms", self.command_timeout_ms),
            ("pid_poll_interval_ms", self.pid_poll_interval_ms),
            ("cpu_sample_interval_ms", self.cpu_sample_interval_ms),
        ]
        .into_iter()
        .find(|(_, value)| *value == 0);
        if let Some((name, _)) = zero {
            return Err(EnvboxError::Config {
                message: format!("{name} must be greater than zero"),
            });
        }
        if self.pid_poll_interval_ms > self.pid_resolve_timeout_ms {
            return Err(EnvboxError::Config {
                message: "pid_poll_interval_ms must not exceed pid_resolve_timeout_ms".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = EnvboxConfig::with_data_dir(PathBuf::from("/tmp/envbox"));
        cfg.validate().expect("defaults validate");
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/envbox/envbox.db"));
        assert_eq!(cfg.environments_dir(), PathBuf::from("/tmp/envbox/environments"));
        assert_eq!(cfg.stop_grace(), Duration::from_millis(500));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut cfg = EnvboxConfig::with_data_dir(PathBuf::from("/tmp/envbox"));
        cfg.command_timeout_ms = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("command_timeout_ms"));
    }

    #[test]
    fn poll_interval_longer_than_deadline_is_rejected() {
        let mut cfg = EnvboxConfig::with_data_dir(PathBuf::from("/tmp/envbox"));
        cfg.pid_poll_interval_ms = 5_000;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let cfg: EnvboxConfig = serde_json::from_str(r#"{"user_mode": true}"#).unwrap();
        assert!(cfg.user_mode);
        assert_eq!(cfg.cpu_sample_interval_ms, 50);
    }
}
