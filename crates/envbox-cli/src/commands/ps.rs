//! `envctl ps`: List environments with their latest metrics.

use clap::Args;
use envbox_runtime::manager::EnvironmentSummary;

use super::Context;
use crate::output;

/// Arguments for the `ps` command.
#[derive(Args, Debug)]
pub struct PsArgs {
    /// Show only environments whose last known state is active.
    #[arg(short, long)]
    pub active: bool,
}

/// Executes the `ps` command.
///
/// States are the last reconciled ones; run `status` to refresh one.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub fn execute(args: PsArgs, ctx: &Context) -> anyhow::Result<()> {
    let summaries: Vec<EnvironmentSummary> = ctx
        .manager()?
        .list()?
        .into_iter()
        .filter(|s| !args.active || s.status.is_active())
        .collect();

    if ctx.json {
        return output::print_json(&summaries);
    }
    if summaries.is_empty() {
        println!("No environments found.");
        return Ok(());
    }

    println!(
        "{:<24} {:<10} {:>5} {:>8} {:<8} {:>7} {:>9}  {:<20}",
        "NAMESPACE", "STATUS", "CPU", "MEMORY", "PID", "CPU%", "RSS", "COMMAND"
    );
    for s in &summaries {
        let (cpu_percent, rss) = s.last_sample.as_ref().map_or_else(
            || ("-".to_string(), "-".to_string()),
            |last| {
                (
                    format!("{:.1}", last.cpu_percent),
                    output::format_megabytes(last.resident_memory_mb),
                )
            },
        );
        let memory = format!("{}M", s.resources.memory_mb);
        println!(
            "{:<24} {:<10} {:>5} {:>8} {:<8} {:>7} {:>9}  {:<20}",
            s.namespace,
            s.status,
            s.resources.cpu,
            memory,
            output::or_dash(s.main_pid),
            cpu_percent,
            rss,
            output::truncate(&s.command, 40)
        );
    }
    Ok(())
}
