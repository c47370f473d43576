//! Admission control for new environments.
//!
//! Capacity checks are point-in-time and advisory: nothing is reserved, so
//! two concurrent requests can each be admitted against the same headroom.

use envbox_common::types::{Namespace, ResourceRequest};
use envbox_core::host::ResourceAdvisor;

use crate::error::{AdmissionError, Resource};

/// Decides whether a new environment may be created.
///
/// Checks run in order: request sanity, namespace uniqueness (`exists`
/// reports whether a live environment already holds the namespace), CPU
/// against physical cores, memory against currently available memory.
///
/// # Errors
///
/// Returns the first [`AdmissionError`] encountered.
#[allow(clippy::cast_precision_loss)]
pub fn admit(
    namespace: &Namespace,
    request: &ResourceRequest,
    advisor: &dyn ResourceAdvisor,
    exists: bool,
) -> Result<(), AdmissionError> {
    if !request.cpu.is_finite() || request.cpu <= 0.0 {
        return Err(AdmissionError::InvalidRequest {
            message: format!("cpu must be a positive number, got {}", request.cpu),
        });
    }
    if request.memory_mb == 0 {
        return Err(AdmissionError::InvalidRequest {
            message: "memory must be at least 1 MB".into(),
        });
    }
    if exists {
        return Err(AdmissionError::DuplicateNamespace {
            namespace: namespace.clone(),
        });
    }

    let capacity = advisor.capacity();

    let cores = capacity.physical_cores as f64;
    if request.cpu > cores {
        tracing::info!(namespace = %namespace, requested = request.cpu, available = cores, "cpu request refused");
        return Err(AdmissionError::CapacityExceeded {
            resource: Resource::Cpu,
            requested: request.cpu,
            available: cores,
        });
    }

    if request.memory_mb > capacity.available_memory_mb {
        tracing::info!(
            namespace = %namespace,
            requested = request.memory_mb,
            available = capacity.available_memory_mb,
            "memory request refused"
        );
        return Err(AdmissionError::CapacityExceeded {
            resource: Resource::Memory,
            requested: request.memory_mb as f64,
            available: capacity.available_memory_mb as f64,
        });
    }

    Ok(())
}
