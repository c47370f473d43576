//! `envctl resources`: Show host capacity available for admission.

use clap::Args;

use super::Context;
use crate::output;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Arguments for the `resources` command.
#[derive(Args, Debug)]
pub struct ResourcesArgs {}

/// Executes the `resources` command.
///
/// # Errors
///
/// Returns an error if the manager cannot be opened.
pub fn execute(_args: ResourcesArgs, ctx: &Context) -> anyhow::Result<()> {
    let manager = ctx.manager()?;
    let capacity = manager.resources();

    if ctx.json {
        return output::print_json(&serde_json::json!({
            "cpu_available": capacity.physical_cores,
            "cpu_logical": capacity.logical_cores,
            "memory_available": capacity.available_memory_mb,
            "memory_total": capacity.total_memory_mb,
            "runtime_available": manager.runtime_available(),
        }));
    }
    println!(
        "CPU:     {} physical cores ({} logical)",
        capacity.physical_cores, capacity.logical_cores
    );
    println!(
        "Memory:  {} available of {}",
        output::format_bytes(capacity.available_memory_mb.saturating_mul(BYTES_PER_MB)),
        output::format_bytes(capacity.total_memory_mb.saturating_mul(BYTES_PER_MB))
    );
    println!(
        "Runtime: {}",
        if manager.runtime_available() {
            "systemd"
        } else {
            "unavailable"
        }
    );
    Ok(())
}
