//! Request bodies.
//!
//! Numeric fields accept JSON numbers or numeric strings, since HTML forms
//! and shell scripts tend to post everything as text.

use envbox_common::constants::{DEFAULT_CPU, DEFAULT_IO_WEIGHT, DEFAULT_MEMORY_MB};
use envbox_common::types::{Namespace, ResourceRequest};
use envbox_runtime::manager::CreateRequest;
use serde::Deserialize;

use crate::error::ApiError;

/// A number given either as a JSON number or as a string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
    /// JSON number.
    Number(f64),
    /// Numeric string.
    Text(String),
}

impl Numeric {
    fn to_f64(&self, field: &str) -> Result<f64, ApiError> {
        let value = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| ApiError::BadRequest(format!("{field} must be a number, got {s:?}")))?,
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ApiError::BadRequest(format!("{field} must be finite")))
        }
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn to_u64(&self, field: &str) -> Result<u64, ApiError> {
        let value = self.to_f64(field)?;
        if value < 0.0 || value.fract() != 0.0 || value > u64::MAX as f64 {
            return Err(ApiError::BadRequest(format!(
                "{field} must be a non-negative whole number, got {value}"
            )));
        }
        Ok(value as u64)
    }
}

/// Body of `POST /create`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBody {
    /// Environment name.
    pub namespace: String,
    /// CPU cores, default 1.
    #[serde(default)]
    pub cpu: Option<Numeric>,
    /// Memory in MB, default 128.
    #[serde(default)]
    pub memory: Option<Numeric>,
    /// I/O weight, default 1.
    #[serde(default)]
    pub io: Option<Numeric>,
    /// Shell command, default empty.
    #[serde(default)]
    pub command: Option<String>,
}

impl CreateBody {
    /// Validates the body and applies defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::BadRequest`] for an invalid namespace or a
    /// malformed number.
    pub fn into_request(self) -> Result<CreateRequest, ApiError> {
        let namespace =
            Namespace::new(self.namespace).map_err(|e| ApiError::BadRequest(e.to_string()))?;
        let cpu = self
            .cpu
            .map_or(Ok(DEFAULT_CPU), |v| v.to_f64("cpu"))?;
        let memory_mb = self
            .memory
            .map_or(Ok(DEFAULT_MEMORY_MB), |v| v.to_u64("memory"))?;
        let io_weight = match self.io {
            None => DEFAULT_IO_WEIGHT,
            Some(v) => u32::try_from(v.to_u64("io")?)
                .map_err(|_| ApiError::BadRequest("io is out of range".into()))?,
        };
        Ok(CreateRequest {
            namespace,
            command: self.command.unwrap_or_default(),
            resources: ResourceRequest {
                cpu,
                memory_mb,
                io_weight,
            },
        })
    }
}

/// Body of `POST /execute`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteBody {
    /// Environment to execute.
    pub namespace: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(json: &str) -> CreateBody {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn defaults_apply() {
        let req = body(r#"{"namespace":"a"}"#).into_request().unwrap();
        assert_eq!(req.namespace.as_str(), "a");
        assert_eq!(req.command, "");
        assert_eq!(req.resources, ResourceRequest::default());
    }

    #[test]
    fn numbers_and_strings_are_both_accepted() {
        let req = body(r#"{"namespace":"a","cpu":"0.5","memory":256,"io":"10","command":"ls"}"#)
            .into_request()
            .unwrap();
        assert!((req.resources.cpu - 0.5).abs() < f64::EPSILON);
        assert_eq!(req.resources.memory_mb, 256);
        assert_eq!(req.resources.io_weight, 10);
        assert_eq!(req.command, "ls");
    }

    #[test]
    fn garbage_numbers_are_rejected() {
        for json in [
            r#"{"namespace":"a","cpu":"lots"}"#,
            r#"{"namespace":"a","memory":-1}"#,
            r#"{"namespace":"a","memory":"1.5"}"#,
            r#"{"namespace":"a","io":99999999999}"#,
        ] {
            assert!(matches!(
                body(json).into_request(),
                Err(ApiError::BadRequest(_))
            ), "{json}");
        }
    }

    #[test]
    fn invalid_namespace_is_rejected() {
        assert!(matches!(
            body(r#"{"namespace":"../etc"}"#).into_request(),
            Err(ApiError::BadRequest(_))
        ));
    }
}
