//! `envctl serve`: Serve the HTTP API.

use std::sync::Arc;

use clap::Args;
use envbox_api::AppState;

use super::Context;

/// Arguments for the `serve` command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on (defaults to the configured bind address).
    #[arg(long, env = "ENVBOX_BIND")]
    pub bind: Option<String>,
}

/// Executes the `serve` command, blocking until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the manager cannot be opened or the address
/// cannot be bound.
pub fn execute(args: ServeArgs, ctx: &Context) -> anyhow::Result<()> {
    let bind = args.bind.unwrap_or_else(|| ctx.config.bind.clone());
    let manager = Arc::new(ctx.manager()?);
    tracing::info!(
        data_dir = %ctx.config.data_dir.display(),
        runtime_available = manager.runtime_available(),
        "envbox manager ready"
    );

    let state = Arc::new(AppState::new(manager));
    tokio::runtime::Runtime::new()?.block_on(envbox_api::serve(&bind, state))
}
