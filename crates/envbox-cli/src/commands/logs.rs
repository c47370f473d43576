//! `envctl logs`: Print an environment's output log.

use clap::Args;

use super::Context;

/// Arguments for the `logs` command.
#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Environment whose output to print.
    pub namespace: String,

    /// Print only the last N lines.
    #[arg(short = 'n', long)]
    pub tail: Option<usize>,
}

/// Executes the `logs` command.
///
/// # Errors
///
/// Returns an error if no output log exists for the environment.
pub fn execute(args: LogsArgs, ctx: &Context) -> anyhow::Result<()> {
    let namespace = super::namespace(&args.namespace)?;
    let content = ctx.manager()?.read_output(&namespace)?;

    match args.tail {
        Some(n) => {
            let lines: Vec<&str> = content.lines().collect();
            for line in &lines[lines.len().saturating_sub(n)..] {
                println!("{line}");
            }
        }
        None => print!("{content}"),
    }
    Ok(())
}
