//! Memory resource control.
//!
//! Translates a memory budget in megabytes into the `MemoryMax=` property,
//! which the service manager writes to the unit's `memory.max`.

/// Builds the `MemoryMax=` property for a ceiling in megabytes.
#[must_use]
pub fn max_property(megabytes: u64) -> String {
    format!("MemoryMax={megabytes}M")
}

/// Builds the `MemorySwapMax=` property that keeps the ceiling from being
/// bypassed through swap.
#[must_use]
pub fn swap_max_property() -> String {
    "MemorySwapMax=0".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_property_uses_megabyte_suffix() {
        assert_eq!(max_property(128), "MemoryMax=128M");
        assert_eq!(max_property(2048), "MemoryMax=2048M");
    }

    #[test]
    fn swap_is_disabled() {
        assert_eq!(swap_max_property(), "MemorySwapMax=0");
    }
}
