//! CLI command definitions and dispatch.

pub mod create;
pub mod exec;
pub mod logs;
pub mod ps;
pub mod resources;
pub mod serve;
pub mod status;
pub mod stop;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use envbox_common::config::EnvboxConfig;
use envbox_common::types::Namespace;
use envbox_runtime::manager::EnvironmentManager;

/// envctl: resource-limited command environments on systemd.
#[derive(Parser, Debug)]
#[command(name = envbox_common::constants::BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Base directory for the database and per-environment directories.
    #[arg(long, global = true, env = "ENVBOX_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Path to the SQLite database (defaults to `<data-dir>/envbox.db`).
    #[arg(long, global = true, env = "ENVBOX_DB")]
    pub db: Option<PathBuf>,

    /// Launch units in the per-user service manager.
    #[arg(long, global = true, env = "ENVBOX_USER_MODE")]
    pub user: bool,

    /// Let systemd garbage-collect units as soon as they stop.
    #[arg(long, global = true, env = "ENVBOX_COLLECT_UNITS")]
    pub collect: bool,

    /// Delete an environment's metric history when it is terminated.
    #[arg(long, global = true, env = "ENVBOX_PURGE_METRICS")]
    pub purge_metrics: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "ENVBOX_LOG_JSON")]
    pub log_json: bool,

    /// Print results as JSON instead of tables.
    #[arg(long, global = true)]
    pub json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Register a new environment.
    Create(create::CreateArgs),
    /// Run an environment's command.
    Exec(exec::ExecArgs),
    /// Show the reconciled status of an environment.
    Status(status::StatusArgs),
    /// List environments with their latest metrics.
    Ps(ps::PsArgs),
    /// Print an environment's output log.
    Logs(logs::LogsArgs),
    /// Terminate environments and remove their state.
    Stop(stop::StopArgs),
    /// Show host capacity available for admission.
    Resources(resources::ResourcesArgs),
    /// Serve the HTTP API.
    Serve(serve::ServeArgs),
}

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    /// Effective configuration.
    pub config: EnvboxConfig,
    /// Whether to print JSON.
    pub json: bool,
}

impl Context {
    /// Opens the environment manager.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the store
    /// cannot be opened.
    pub fn manager(&self) -> anyhow::Result<EnvironmentManager> {
        EnvironmentManager::open(self.config.clone()).with_context(|| {
            format!("failed to open envbox state in {}", self.config.data_dir.display())
        })
    }
}

impl Cli {
    /// Builds the effective configuration from defaults and flags.
    #[must_use]
    pub fn config(&self) -> EnvboxConfig {
        let mut config = self
            .data_dir
            .clone()
            .map_or_else(EnvboxConfig::default, EnvboxConfig::with_data_dir);
        if let Some(db) = &self.db {
            config.db_path.clone_from(db);
        }
        config.user_mode = self.user;
        config.collect_units = self.collect;
        config.purge_metrics_on_terminate = self.purge_metrics;
        config
    }
}

/// Parses a namespace argument.
///
/// # Errors
///
/// Returns an error if the value is not a valid namespace.
pub fn namespace(value: &str) -> anyhow::Result<Namespace> {
    Ok(Namespace::new(value)?)
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let ctx = Context {
        config: cli.config(),
        json: cli.json,
    };
    match cli.command {
        Command::Create(args) => create::execute(args, &ctx),
        Command::Exec(args) => exec::execute(args, &ctx),
        Command::Status(args) => status::execute(args, &ctx),
        Command::Ps(args) => ps::execute(args, &ctx),
        Command::Logs(args) => logs::execute(args, &ctx),
        Command::Stop(args) => stop::execute(args, &ctx),
        Command::Resources(args) => resources::execute(args, &ctx),
        Command::Serve(args) => serve::execute(args, &ctx),
    }
}
