//! `envctl exec`: Run an environment's command.

use std::time::Duration;

use clap::Args;

use super::Context;
use crate::output;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Arguments for the `exec` command.
#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Environment to run.
    pub namespace: String,

    /// Block until the command finishes, then print its output.
    #[arg(short, long)]
    pub wait: bool,
}

/// Executes the `exec` command.
///
/// # Errors
///
/// Returns an error if the environment does not exist or the unit
/// cannot be launched.
pub fn execute(args: ExecArgs, ctx: &Context) -> anyhow::Result<()> {
    let namespace = super::namespace(&args.namespace)?;
    let manager = ctx.manager()?;
    let handle = manager.execute(&namespace)?;

    if !args.wait {
        if ctx.json {
            return output::print_json(&handle);
        }
        println!("{}", handle.message);
        println!("  unit:   {}", handle.unit);
        println!("  pid:    {}", output::or_dash(handle.pid));
        println!("  output: {}", handle.output_path.display());
        return Ok(());
    }

    let report = loop {
        let report = manager.status(&namespace)?;
        if !report.environment.status().is_active() {
            break report;
        }
        std::thread::sleep(WAIT_POLL_INTERVAL);
    };

    if ctx.json {
        return output::print_json(&report);
    }
    print!("{}", manager.read_output(&namespace).unwrap_or_default());
    println!("[{}] {}", namespace, report.environment.status());
    Ok(())
}
