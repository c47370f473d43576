//! `envctl stop`: Terminate environments and remove their state.

use clap::Args;
use envbox_runtime::error::ManagerError;

use super::Context;

/// Arguments for the `stop` command.
#[derive(Args, Debug)]
pub struct StopArgs {
    /// Environments to terminate.
    #[arg(required = true)]
    pub namespaces: Vec<String>,
}

/// Executes the `stop` command.
///
/// Every namespace is attempted even if an earlier one fails.
///
/// # Errors
///
/// Returns an error if any environment could not be terminated cleanly.
pub fn execute(args: StopArgs, ctx: &Context) -> anyhow::Result<()> {
    let manager = ctx.manager()?;
    let mut failed = 0usize;

    for name in &args.namespaces {
        let result = super::namespace(name).and_then(|ns| Ok(manager.terminate(&ns)?));
        match result {
            Ok(ack) => println!("{}", ack.message),
            Err(e) => {
                failed += 1;
                match e.downcast_ref::<ManagerError>() {
                    Some(ManagerError::TerminationPartialFailure { failures, .. }) => {
                        eprintln!("{name}: terminated with {} failed step(s)", failures.len());
                        for failure in failures {
                            eprintln!("  {failure}");
                        }
                    }
                    _ => eprintln!("{name}: {e}"),
                }
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} environment(s) not cleanly terminated", args.namespaces.len());
    }
    Ok(())
}
