//! HTTP API for envbox.
//!
//! Thin JSON layer over [`EnvironmentManager`]. Manager calls block, so every
//! handler runs them on tokio's blocking pool.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod error;
pub mod request;
mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use envbox_runtime::manager::EnvironmentManager;

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The environment manager serving every request.
    pub manager: Arc<EnvironmentManager>,
}

impl AppState {
    /// Wraps a manager.
    #[must_use]
    pub const fn new(manager: Arc<EnvironmentManager>) -> Self {
        Self { manager }
    }
}

/// Builds the API router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/create", post(routes::create))
        .route("/execute", post(routes::execute))
        .route("/status/:namespace", get(routes::status))
        .route("/list", get(routes::list))
        .route("/output/:namespace", get(routes::output))
        .route("/terminate/:namespace", delete(routes::terminate))
        .route("/resources", get(routes::resources))
        .route("/healthz", get(routes::healthz))
        .with_state(state)
}

/// Serves the API on `bind` until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(bind: &str, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "starting API server");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;
    Ok(())
}
