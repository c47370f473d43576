//! CPU resource control.
//!
//! Translates a budget in logical cores into the `CPUQuota=` property,
//! which the service manager writes to the unit's `cpu.max`.

/// Percentage of one core granted per logical core requested.
const PERCENT_PER_CORE: f64 = 100.0;

/// Converts a CPU budget in logical cores into a quota percentage.
///
/// `1.0` core is `100%`, `0.5` is `50%`, `2.5` is `250%`. The result is
/// rounded to the nearest percent and never below `1`, since a zero quota
/// would be rejected by the service manager.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn quota_percent(cores: f64) -> u64 {
    if !cores.is_finite() || cores <= 0.0 {
        return 1;
    }
    ((cores * PERCENT_PER_CORE).round() as u64).max(1)
}

/// Builds the `CPUQuota=` property for a CPU budget in logical cores.
#[must_use]
pub fn quota_property(cores: f64) -> String {
    format!("CPUQuota={}%", quota_percent(cores))
}
