//! Cgroup-backed resource properties for isolation units.
//!
//! The service manager owns the unified hierarchy at `/sys/fs/cgroup`; we
//! never write control files ourselves. Instead a [`ResourceRequest`] is
//! translated into unit properties that the manager applies to the unit's
//! cgroup when it is created.

pub mod cpu;
pub mod io;
pub mod memory;

use envbox_common::types::ResourceRequest;

/// Resource properties for one isolation unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitProperties {
    properties: Vec<String>,
}

impl UnitProperties {
    /// Translates a resource request into unit properties.
    ///
    /// CPU becomes a bandwidth quota, memory a hard ceiling with swap
    /// disabled, and the I/O weight a proportional `io.weight`.
    #[must_use]
    pub fn from_request(request: &ResourceRequest) -> Self {
        let properties = vec![
            cpu::quota_property(request.cpu),
            memory::max_property(request.memory_mb),
            memory::swap_max_property(),
            io::weight_property(request.io_weight),
        ];
        tracing::debug!(?properties, "unit resource properties");
        Self { properties }
    }

    /// Adds an arbitrary `Key=Value` property.
    #[must_use]
    pub fn with(mut self, property: impl Into<String>) -> Self {
        self.properties.push(property.into());
        self
    }

    /// Returns the properties as `--property=Key=Value` arguments.
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        self.properties
            .iter()
            .map(|p| format!("--property={p}"))
            .collect()
    }

    /// Returns the raw `Key=Value` properties.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_translates_to_all_controllers() {
        let request = ResourceRequest {
            cpu: 0.5,
            memory_mb: 256,
            io_weight: 20_000,
        };
        let props = UnitProperties::from_request(&request);
        assert_eq!(
            props.as_slice(),
            [
                "CPUQuota=50%",
                "MemoryMax=256M",
                "MemorySwapMax=0",
                "IOWeight=10000"
            ]
        );
    }

    #[test]
    fn extra_properties_render_as_arguments() {
        let props = UnitProperties::from_request(&ResourceRequest::default())
            .with("StandardOutput=append:/tmp/x.log");
        let args = props.to_args();
        assert_eq!(args.first().map(String::as_str), Some("--property=CPUQuota=100%"));
        assert_eq!(
            args.last().map(String::as_str),
            Some("--property=StandardOutput=append:/tmp/x.log")
        );
    }
}
