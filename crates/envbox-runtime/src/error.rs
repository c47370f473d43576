//! Error types for environment lifecycle operations.

use std::fmt;

use envbox_common::error::EnvboxError;
use envbox_common::types::Namespace;
use serde::Serialize;
use thiserror::Error;

use crate::termination::StepFailure;

/// Host resource that admission control checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    /// Physical CPU cores.
    Cpu,
    /// Available memory in MB.
    Memory,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu cores"),
            Self::Memory => f.write_str("MB of memory"),
        }
    }
}

/// Reasons a creation request is refused.
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// The request itself is malformed.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// What is wrong with the request.
        message: String,
    },

    /// A live environment already uses this namespace.
    #[error("environment {namespace} already exists")]
    DuplicateNamespace {
        /// The contested namespace.
        namespace: Namespace,
    },

    /// The request exceeds what the host can currently offer.
    #[error("requested {requested} {resource}, only {available} available")]
    CapacityExceeded {
        /// Resource that ran short.
        resource: Resource,
        /// Amount requested.
        requested: f64,
        /// Amount the host reported.
        available: f64,
    },
}

/// Errors returned by [`EnvironmentManager`](crate::manager::EnvironmentManager).
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The creation request was refused.
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    /// No environment with this namespace exists.
    #[error("environment not found: {namespace}")]
    NotFound {
        /// Namespace that was looked up.
        namespace: String,
    },

    /// The isolation runtime is missing or could not be invoked.
    #[error("isolation runtime unavailable: {message}")]
    RuntimeUnavailable {
        /// What went wrong.
        message: String,
    },

    /// The runtime refused to start the unit.
    #[error("failed to launch {namespace}: {message}")]
    LaunchFailed {
        /// Environment being launched.
        namespace: Namespace,
        /// Diagnostic reported by the runtime.
        message: String,
    },

    /// Termination finished but one or more cleanup steps failed.
    ///
    /// The environment is gone from the registry and store regardless.
    #[error("termination of {namespace} incomplete: {}", describe(failures))]
    TerminationPartialFailure {
        /// Environment that was terminated.
        namespace: Namespace,
        /// Steps that did not succeed.
        failures: Vec<StepFailure>,
    },

    /// Lower-level failure (I/O, storage, validation).
    #[error(transparent)]
    Common(#[from] EnvboxError),
}

impl ManagerError {
    pub(crate) fn not_found(namespace: &Namespace) -> Self {
        Self::NotFound {
            namespace: namespace.to_string(),
        }
    }

    /// Returns whether the error was caused by the caller's input rather
    /// than by the host.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Admission(_)
                | Self::NotFound { .. }
                | Self::Common(EnvboxError::InvalidNamespace { .. })
        )
    }
}

fn describe(failures: &[StepFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::termination::TerminationStep;

    #[test]
    fn capacity_message_carries_both_numbers() {
        let err = AdmissionError::CapacityExceeded {
            resource: Resource::Cpu,
            requested: 100.0,
            available: 4.0,
        };
        assert_eq!(err.to_string(), "requested 100 cpu cores, only 4 available");
    }

    #[test]
    fn memory_message_names_the_unit() {
        let err = AdmissionError::CapacityExceeded {
            resource: Resource::Memory,
            requested: 4096.0,
            available: 2048.0,
        };
        assert!(err.to_string().contains("MB of memory"));
    }

    #[test]
    fn partial_failure_lists_every_step() {
        let err = ManagerError::TerminationPartialFailure {
            namespace: Namespace::new("a").unwrap(),
            failures: vec![
                StepFailure::new(TerminationStep::Stop, "timed out"),
                StepFailure::new(TerminationStep::RemoveDirectory, "busy"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("stop: timed out"));
        assert!(msg.contains("remove-directory: busy"));
    }

    #[test]
    fn client_errors_are_classified() {
        assert!(ManagerError::NotFound { namespace: "x".into() }.is_client_error());
        assert!(
            !ManagerError::RuntimeUnavailable {
                message: "no systemd".into()
            }
            .is_client_error()
        );
    }
}
