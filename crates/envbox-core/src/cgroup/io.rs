//! I/O resource control.
//!
//! Translates the advisory I/O weight into the `IOWeight=` property,
//! which the service manager writes to the unit's `io.weight`.

/// Smallest weight accepted by the io controller.
pub const MIN_IO_WEIGHT: u32 = 1;

/// Largest weight accepted by the io controller.
pub const MAX_IO_WEIGHT: u32 = 10_000;

/// Clamps an advisory weight into the controller's accepted range.
#[must_use]
pub fn clamp_weight(weight: u32) -> u32 {
    weight.clamp(MIN_IO_WEIGHT, MAX_IO_WEIGHT)
}

/// Builds the `IOWeight=` property.
#[must_use]
pub fn weight_property(weight: u32) -> String {
    format!("IOWeight={}", clamp_weight(weight))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_is_clamped_into_range() {
        assert_eq!(clamp_weight(0), 1);
        assert_eq!(clamp_weight(500), 500);
        assert_eq!(clamp_weight(50_000), 10_000);
    }

    #[test]
    fn property_is_formatted() {
        assert_eq!(weight_property(100), "IOWeight=100");
    }
}
