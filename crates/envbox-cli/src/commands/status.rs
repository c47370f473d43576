//! `envctl status`: Show the reconciled status of an environment.

use clap::Args;

use super::Context;
use crate::output;

/// Arguments for the `status` command.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Environment to inspect.
    pub namespace: String,

    /// Also print the recorded metric history.
    #[arg(long)]
    pub history: bool,
}

/// Executes the `status` command.
///
/// # Errors
///
/// Returns an error if the environment does not exist.
pub fn execute(args: StatusArgs, ctx: &Context) -> anyhow::Result<()> {
    let namespace = super::namespace(&args.namespace)?;
    let manager = ctx.manager()?;
    let report = manager.status(&namespace)?;
    let history = if args.history {
        manager.samples(&namespace)?
    } else {
        Vec::new()
    };

    if ctx.json {
        return if args.history {
            output::print_json(&serde_json::json!({ "status": report, "history": history }))
        } else {
            output::print_json(&report)
        };
    }

    let env = &report.environment;
    println!("Namespace: {}", env.namespace());
    println!("Status:    {}", env.status());
    println!("Command:   {}", env.command());
    println!(
        "Limits:    {} cpu, {} MB memory, io weight {}",
        env.resources().cpu,
        env.resources().memory_mb,
        env.resources().io_weight
    );
    println!("Unit:      {}", output::or_dash(env.unit()));
    println!("PID:       {}", output::or_dash(env.main_pid()));
    if let Some(raw) = &report.runtime {
        println!("Exit code: {}", output::or_dash(raw.exit_code));
    }
    if let Some(sample) = env.last_sample() {
        println!(
            "Usage:     {:.1}% cpu, {:.1} MB rss ({})",
            sample.cpu_percent,
            sample.resident_memory_mb,
            sample.timestamp.to_rfc3339()
        );
    }

    if !history.is_empty() {
        println!();
        println!(
            "{:<32} {:<10} {:>7} {:>10} {:>12} {:>12}",
            "TIMESTAMP", "STATUS", "CPU%", "RSS MB", "READ", "WRITTEN"
        );
        for s in &history {
            println!(
                "{:<32} {:<10} {:>7.1} {:>10.1} {:>12} {:>12}",
                s.timestamp.to_rfc3339(),
                s.status,
                s.cpu_percent,
                s.resident_memory_mb,
                output::format_bytes(s.io_read_bytes),
                output::format_bytes(s.io_write_bytes)
            );
        }
    }
    Ok(())
}
