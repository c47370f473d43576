//! Mapping of manager errors onto HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use envbox_common::error::EnvboxError;
use envbox_runtime::error::{AdmissionError, ManagerError};
use serde_json::json;
use thiserror::Error;

/// Error returned by API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The manager refused or failed the operation.
    #[error(transparent)]
    Manager(#[from] ManagerError),

    /// The request body could not be understood.
    #[error("{0}")]
    BadRequest(String),

    /// A blocking task panicked or was cancelled.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Manager(err) => match err {
                ManagerError::Admission(AdmissionError::DuplicateNamespace { .. }) => {
                    StatusCode::CONFLICT
                }
                ManagerError::Admission(_)
                | ManagerError::Common(EnvboxError::InvalidNamespace { .. }) => {
                    StatusCode::BAD_REQUEST
                }
                ManagerError::NotFound { .. } => StatusCode::NOT_FOUND,
                ManagerError::RuntimeUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                ManagerError::LaunchFailed { .. }
                | ManagerError::TerminationPartialFailure { .. }
                | ManagerError::Common(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(%status, error = %self, "request failed");
        }
        let body = match &self {
            Self::Manager(ManagerError::TerminationPartialFailure { failures, .. }) => {
                json!({ "error": self.to_string(), "failures": failures })
            }
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
