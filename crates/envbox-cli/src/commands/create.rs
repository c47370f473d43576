//! `envctl create`: Register a new environment.

use clap::Args;
use envbox_common::constants::{DEFAULT_CPU, DEFAULT_IO_WEIGHT, DEFAULT_MEMORY_MB};
use envbox_common::types::ResourceRequest;
use envbox_runtime::manager::CreateRequest;

use super::Context;
use crate::output;

/// Arguments for the `create` command.
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Unique environment name.
    pub namespace: String,

    /// CPU budget in cores (fractions allowed).
    #[arg(long, default_value_t = DEFAULT_CPU)]
    pub cpu: f64,

    /// Memory ceiling in MB.
    #[arg(long, default_value_t = DEFAULT_MEMORY_MB)]
    pub memory: u64,

    /// I/O weight (1-10000).
    #[arg(long, default_value_t = DEFAULT_IO_WEIGHT)]
    pub io: u32,

    /// Shell command to run on `exec`.
    #[arg(short, long, default_value = "")]
    pub command: String,
}

/// Executes the `create` command.
///
/// # Errors
///
/// Returns an error if the namespace is invalid or admission fails.
pub fn execute(args: CreateArgs, ctx: &Context) -> anyhow::Result<()> {
    let request = CreateRequest {
        namespace: super::namespace(&args.namespace)?,
        command: args.command,
        resources: ResourceRequest {
            cpu: args.cpu,
            memory_mb: args.memory,
            io_weight: args.io,
        },
    };
    let env = ctx.manager()?.create(request)?;

    if ctx.json {
        return output::print_json(&env);
    }
    println!(
        "Created {} ({} cpu, {} MB memory)",
        env.namespace(),
        env.resources().cpu,
        env.resources().memory_mb
    );
    Ok(())
}
