//! Domain primitive types used across the envbox workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::MAX_NAMESPACE_LEN;
use crate::error::EnvboxError;

/// Caller-chosen unique identifier for one managed environment.
///
/// Validated on construction: 1 to 64 characters drawn from
/// `[A-Za-z0-9_.-]`, not `.` or `..`, and not starting with `-`. A valid
/// namespace is therefore always a single, harmless path component and a
/// safe fragment of a unit name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace(String);

impl Namespace {
    /// Validates and wraps a namespace string.
    ///
    /// # Errors
    ///
    /// Returns [`EnvboxError::InvalidNamespace`] if the value is empty, too
    /// long, contains characters outside `[A-Za-z0-9_.-]`, is `.`/`..`, or
    /// starts with `-`.
    pub fn new(value: impl Into<String>) -> crate::error::Result<Self> {
        let value = value.into();
        let reason = if value.is_empty() {
            Some("must not be empty")
        } else if value.chars().count() > MAX_NAMESPACE_LEN {
            Some("must be at most 64 characters")
        } else if value == "." || value == ".." {
            Some("must not be a relative path component")
        } else if value.starts_with('-') {
            Some("must not start with '-'")
        } else if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        {
            Some("may only contain ASCII letters, digits, '_', '.' and '-'")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(EnvboxError::InvalidNamespace { value, reason }),
            None => Ok(Self(value)),
        }
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Namespace {
    type Error = EnvboxError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Namespace> for String {
    fn from(ns: Namespace) -> Self {
        ns.0
    }
}

impl FromStr for Namespace {
    type Err = EnvboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Opaque handle of an isolation unit, assigned by the runtime at launch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(String);

impl UnitId {
    /// Wraps a unit name.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resources requested for an environment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequest {
    /// CPU budget in logical cores; fractions allowed.
    pub cpu: f64,
    /// Memory ceiling in megabytes.
    pub memory_mb: u64,
    /// Advisory I/O weight.
    pub io_weight: u32,
}

impl Default for ResourceRequest {
    fn default() -> Self {
        Self {
            cpu: crate::constants::DEFAULT_CPU,
            memory_mb: crate::constants::DEFAULT_MEMORY_MB,
            io_weight: crate::constants::DEFAULT_IO_WEIGHT,
        }
    }
}

/// Lifecycle state of an environment.
///
/// `Created` is assigned at creation and `Terminated` only by the
/// termination protocol; every other state comes from reconciling the
/// isolation runtime's raw status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Registered but never launched.
    Created,
    /// The unit is being activated.
    Starting,
    /// The command is running.
    Running,
    /// The unit is being deactivated.
    Finishing,
    /// The command exited on its own without a failure signal.
    Finished,
    /// The command or its unit failed.
    Error,
    /// Shut down on caller request.
    Terminated,
    /// The runtime could not be consulted or reported something unrecognised.
    Unknown,
}

impl LifecycleState {
    /// Every lifecycle state, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::Created,
        Self::Starting,
        Self::Running,
        Self::Finishing,
        Self::Finished,
        Self::Error,
        Self::Terminated,
        Self::Unknown,
    ];

    /// Returns the lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Finishing => "finishing",
            Self::Finished => "finished",
            Self::Error => "error",
            Self::Terminated => "terminated",
            Self::Unknown => "unknown",
        }
    }

    /// Returns whether a unit in this state may still hold resources.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Finishing)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleState {
    type Err = EnvboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| EnvboxError::UnknownState(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_accepts_simple_names() {
        for name in ["a", "build-42", "team_a.job", "X"] {
            assert!(Namespace::new(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn namespace_rejects_path_traversal() {
        for name in ["", ".", "..", "../etc", "a/b", "-rf", "sp ace", "ünï"] {
            assert!(Namespace::new(name).is_err(), "{name:?} should be rejected");
        }
    }

    #[test]
    fn namespace_rejects_overlong_values() {
        let long = "a".repeat(MAX_NAMESPACE_LEN + 1);
        assert!(Namespace::new(long).is_err());
        assert!(Namespace::new("a".repeat(MAX_NAMESPACE_LEN)).is_ok());
    }

    #[test]
    fn namespace_deserialization_validates() {
        let ok: Namespace = serde_json::from_str("\"alpha\"").unwrap();
        assert_eq!(ok.as_str(), "alpha");
        assert!(serde_json::from_str::<Namespace>("\"../x\"").is_err());
    }

    #[test]
    fn lifecycle_state_parses_its_own_display() {
        for state in LifecycleState::ALL {
            assert_eq!(state.to_string().parse::<LifecycleState>().unwrap(), state);
        }
        assert!("stopped".parse::<LifecycleState>().is_err());
    }

    #[test]
    fn lifecycle_state_serializes_lowercase() {
        let json = serde_json::to_string(&LifecycleState::Finishing).unwrap();
        assert_eq!(json, "\"finishing\"");
    }

    #[test]
    fn resource_request_defaults_match_create_defaults() {
        let req = ResourceRequest::default();
        assert!((req.cpu - 1.0).abs() < f64::EPSILON);
        assert_eq!(req.memory_mb, 128);
        assert_eq!(req.io_weight, 1);
    }
}
