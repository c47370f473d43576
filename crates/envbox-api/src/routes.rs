//! Route handlers.

use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use envbox_common::types::Namespace;
use envbox_runtime::error::ManagerError;
use serde_json::json;
use tokio_util::io::ReaderStream;

use crate::AppState;
use crate::error::ApiError;
use crate::request::{CreateBody, ExecuteBody};

/// Runs a blocking manager call off the async executor.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ManagerError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::from)
}

/// Namespaces in paths that fail validation cannot name anything.
fn lookup(namespace: String) -> Result<Namespace, ApiError> {
    Namespace::new(namespace.clone())
        .map_err(|_| ApiError::Manager(ManagerError::NotFound { namespace }))
}

pub(crate) async fn create(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError> {
    let request = body.into_request()?;
    let manager = Arc::clone(&state.manager);
    let env = blocking(move || manager.create(request)).await?;
    Ok((StatusCode::CREATED, Json(env)))
}

pub(crate) async fn execute(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ExecuteBody>,
) -> Result<impl IntoResponse, ApiError> {
    let namespace = lookup(body.namespace)?;
    let manager = Arc::clone(&state.manager);
    let handle = blocking(move || manager.execute(&namespace)).await?;
    Ok((StatusCode::ACCEPTED, Json(handle)))
}

pub(crate) async fn status(
    State(state): State<Arc<AppState>>,
    Path(namespace): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let namespace = lookup(namespace)?;
    let manager = Arc::clone(&state.manager);
    Ok(Json(blocking(move || manager.status(&namespace)).await?))
}

pub(crate) async fn list(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let manager = Arc::clone(&state.manager);
    Ok(Json(blocking(move || manager.list()).await?))
}

pub(crate) async fn output(
    State(state): State<Arc<AppState>>,
    Path(namespace): Path<String>,
) -> Result<Response, ApiError> {
    let ns = lookup(namespace)?;
    let manager = Arc::clone(&state.manager);
    let lookup_ns = ns.clone();
    let path = blocking(move || manager.output_path(&lookup_ns)).await?;

    let file = tokio::fs::File::open(&path).await.map_err(|e| {
        tracing::debug!(namespace = %ns, error = %e, "output log vanished");
        ApiError::Manager(ManagerError::NotFound {
            namespace: ns.to_string(),
        })
    })?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

pub(crate) async fn terminate(
    State(state): State<Arc<AppState>>,
    Path(namespace): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let namespace = lookup(namespace)?;
    let manager = Arc::clone(&state.manager);
    Ok(Json(blocking(move || manager.terminate(&namespace)).await?))
}

pub(crate) async fn resources(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let manager = Arc::clone(&state.manager);
    let capacity = blocking(move || Ok(manager.resources())).await?;
    Ok(Json(json!({
        "cpu_available": capacity.physical_cores,
        "cpu_logical": capacity.logical_cores,
        "memory_available": capacity.available_memory_mb,
        "memory_total": capacity.total_memory_mb,
    })))
}

pub(crate) async fn healthz(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let manager = Arc::clone(&state.manager);
    let runtime_available = blocking(move || Ok(manager.runtime_available())).await?;
    Ok(Json(json!({
        "status": "ok",
        "runtime_available": runtime_available,
    })))
}
