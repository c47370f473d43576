//! Host capacity reporting for admission control.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use serde::Serialize;
use sysinfo::System;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Host capacity at the moment of the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HostCapacity {
    /// Physical CPU cores (falls back to logical cores when unknown).
    pub physical_cores: usize,
    /// Logical CPUs available to this process.
    pub logical_cores: usize,
    /// Installed memory in MB.
    pub total_memory_mb: u64,
    /// Memory currently available for new workloads, in MB.
    pub available_memory_mb: u64,
}

/// Reports host capacity at query time.
pub trait ResourceAdvisor: Send + Sync {
    /// Returns a fresh capacity reading.
    fn capacity(&self) -> HostCapacity;
}

/// Advisor backed by live kernel counters.
pub struct SysinfoAdvisor {
    system: Mutex<System>,
}

impl SysinfoAdvisor {
    /// Creates an advisor; memory is refreshed on every query.
    #[must_use]
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoAdvisor {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceAdvisor for SysinfoAdvisor {
    fn capacity(&self) -> HostCapacity {
        let mut system = self
            .system
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        system.refresh_memory();

        let logical_cores = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
        let physical_cores = system.physical_core_count().unwrap_or(logical_cores);

        let capacity = HostCapacity {
            physical_cores,
            logical_cores,
            total_memory_mb: system.total_memory() / BYTES_PER_MB,
            available_memory_mb: system.available_memory() / BYTES_PER_MB,
        };
        tracing::debug!(?capacity, "host capacity");
        capacity
    }
}

/// Advisor that always reports the same capacity.
///
/// Useful for tests and for pinning admission to a configured budget.
#[derive(Debug, Clone, Copy)]
pub struct StaticAdvisor(pub HostCapacity);

impl StaticAdvisor {
    /// Builds an advisor reporting `cores` cores and `memory_mb` MB free.
    #[must_use]
    pub const fn new(cores: usize, memory_mb: u64) -> Self {
        Self(HostCapacity {
            physical_cores: cores,
            logical_cores: cores,
            total_memory_mb: memory_mb,
            available_memory_mb: memory_mb,
        })
    }
}

impl ResourceAdvisor for StaticAdvisor {
    fn capacity(&self) -> HostCapacity {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_capacity_is_plausible() {
        let cap = SysinfoAdvisor::new().capacity();
        assert!(cap.physical_cores >= 1);
        assert!(cap.logical_cores >= 1);
    }

    #[test]
    fn static_advisor_reports_what_it_was_given() {
        let cap = StaticAdvisor::new(4, 2048).capacity();
        assert_eq!(cap.physical_cores, 4);
        assert_eq!(cap.available_memory_mb, 2048);
    }
}
