//! Point-in-time resource samples for environments.
//!
//! Sampling never fails: a process that vanished or cannot be read yields a
//! zero-valued sample so the status path stays infallible.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use envbox_common::types::{LifecycleState, Namespace};
use envbox_core::process::ProcessInspector;
use serde::{Deserialize, Serialize};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// One immutable resource observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Environment the sample belongs to.
    pub namespace: Namespace,
    /// When the sample was taken.
    pub timestamp: DateTime<Utc>,
    /// Lifecycle state at sampling time.
    pub status: LifecycleState,
    /// CPU utilisation; 100.0 is one full core.
    pub cpu_percent: f32,
    /// Resident memory in MB.
    pub resident_memory_mb: f64,
    /// Cumulative bytes read.
    pub io_read_bytes: u64,
    /// Cumulative bytes written.
    pub io_write_bytes: u64,
    /// Process that was sampled.
    pub pid: Option<u32>,
    /// Executable name of the sampled process.
    pub process_name: Option<String>,
}

impl MetricSample {
    /// Builds a sample with every counter at zero.
    #[must_use]
    pub const fn zeroed(
        namespace: Namespace,
        status: LifecycleState,
        timestamp: DateTime<Utc>,
        pid: Option<u32>,
    ) -> Self {
        Self {
            namespace,
            timestamp,
            status,
            cpu_percent: 0.0,
            resident_memory_mb: 0.0,
            io_read_bytes: 0,
            io_write_bytes: 0,
            pid,
            process_name: None,
        }
    }
}

/// Last-known metric fields kept on the environment itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSummary {
    /// When the sample was taken.
    pub timestamp: DateTime<Utc>,
    /// Lifecycle state at sampling time.
    pub status: LifecycleState,
    /// CPU utilisation.
    pub cpu_percent: f32,
    /// Resident memory in MB.
    pub resident_memory_mb: f64,
    /// Sampled pid.
    pub pid: Option<u32>,
    /// Sampled executable name.
    pub process_name: Option<String>,
}

impl From<&MetricSample> for SampleSummary {
    fn from(sample: &MetricSample) -> Self {
        Self {
            timestamp: sample.timestamp,
            status: sample.status,
            cpu_percent: sample.cpu_percent,
            resident_memory_mb: sample.resident_memory_mb,
            pid: sample.pid,
            process_name: sample.process_name.clone(),
        }
    }
}

/// Produces [`MetricSample`]s from a [`ProcessInspector`].
#[derive(Clone)]
pub struct MetricsSampler {
    inspector: Arc<dyn ProcessInspector>,
}

impl MetricsSampler {
    /// Creates a sampler over `inspector`.
    #[must_use]
    pub fn new(inspector: Arc<dyn ProcessInspector>) -> Self {
        Self { inspector }
    }

    /// Samples `pid` on behalf of `namespace`.
    ///
    /// The timestamp is clamped to `not_before` (the previous sample's time)
    /// so samples of one environment never go backwards.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn sample(
        &self,
        namespace: &Namespace,
        status: LifecycleState,
        pid: Option<u32>,
        not_before: Option<DateTime<Utc>>,
    ) -> MetricSample {
        let stats = pid.and_then(|p| self.inspector.inspect(p));
        let timestamp = clamp(Utc::now(), not_before);

        let Some(stats) = stats else {
            tracing::debug!(namespace = %namespace, ?pid, "no readable process, recording zero sample");
            return MetricSample::zeroed(namespace.clone(), status, timestamp, pid);
        };

        MetricSample {
            namespace: namespace.clone(),
            timestamp,
            status,
            cpu_percent: stats.cpu_percent,
            resident_memory_mb: stats.resident_bytes as f64 / BYTES_PER_MB,
            io_read_bytes: stats.io_read_bytes,
            io_write_bytes: stats.io_write_bytes,
            pid,
            process_name: stats.name,
        }
    }

    /// Builds a zero-valued sample without consulting the inspector.
    #[must_use]
    pub fn final_sample(
        namespace: &Namespace,
        status: LifecycleState,
        pid: Option<u32>,
        not_before: Option<DateTime<Utc>>,
    ) -> MetricSample {
        MetricSample::zeroed(namespace.clone(), status, clamp(Utc::now(), not_before), pid)
    }
}

impl std::fmt::Debug for MetricsSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsSampler").finish_non_exhaustive()
    }
}

fn clamp(now: DateTime<Utc>, not_before: Option<DateTime<Utc>>) -> DateTime<Utc> {
    not_before.map_or(now, |prev| now.max(prev))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use envbox_core::process::ProcessStats;

    use super::*;

    struct FixedInspector(Option<ProcessStats>);

    impl ProcessInspector for FixedInspector {
        fn inspect(&self, _pid: u32) -> Option<ProcessStats> {
            self.0.clone()
        }
    }

    fn ns() -> Namespace {
        Namespace::new("metrics").unwrap()
    }

    #[test]
    fn readable_process_is_converted_to_megabytes() {
        let sampler = MetricsSampler::new(Arc::new(FixedInspector(Some(ProcessStats {
            cpu_percent: 12.5,
            resident_bytes: 64 * 1024 * 1024,
            io_read_bytes: 10,
            io_write_bytes: 20,
            name: Some("sleep".into()),
        }))));
        let sample = sampler.sample(&ns(), LifecycleState::Running, Some(42), None);
        assert!((sample.resident_memory_mb - 64.0).abs() < f64::EPSILON);
        assert!((sample.cpu_percent - 12.5).abs() < f32::EPSILON);
        assert_eq!(sample.io_write_bytes, 20);
        assert_eq!(sample.process_name.as_deref(), Some("sleep"));
        assert_eq!(sample.pid, Some(42));
    }

    #[test]
    fn unreadable_process_yields_zero_sample() {
        let sampler = MetricsSampler::new(Arc::new(FixedInspector(None)));
        let sample = sampler.sample(&ns(), LifecycleState::Finished, Some(42), None);
        assert_eq!(sample.cpu_percent, 0.0);
        assert_eq!(sample.resident_memory_mb, 0.0);
        assert_eq!(sample.status, LifecycleState::Finished);
        assert!(sample.process_name.is_none());
    }

    #[test]
    fn missing_pid_skips_inspection() {
        let sampler = MetricsSampler::new(Arc::new(FixedInspector(Some(ProcessStats {
            cpu_percent: 99.0,
            resident_bytes: 1,
            io_read_bytes: 0,
            io_write_bytes: 0,
            name: None,
        }))));
        let sample = sampler.sample(&ns(), LifecycleState::Unknown, None, None);
        assert_eq!(sample.cpu_percent, 0.0);
    }

    #[test]
    fn timestamps_never_go_backwards() {
        let future = Utc::now() + Duration::hours(1);
        let sampler = MetricsSampler::new(Arc::new(FixedInspector(None)));
        let sample = sampler.sample(&ns(), LifecycleState::Running, None, Some(future));
        assert_eq!(sample.timestamp, future);

        let last = MetricsSampler::final_sample(&ns(), LifecycleState::Terminated, None, Some(future));
        assert_eq!(last.timestamp, future);
    }
}
