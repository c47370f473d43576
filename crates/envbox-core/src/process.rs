//! Point-in-time process introspection.

use std::time::Duration;

use sysinfo::{Pid, System};

/// Resource counters for one process.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessStats {
    /// CPU utilisation over the sampling interval; 100.0 is one full core.
    pub cpu_percent: f32,
    /// Resident set size in bytes.
    pub resident_bytes: u64,
    /// Cumulative bytes read from storage.
    pub io_read_bytes: u64,
    /// Cumulative bytes written to storage.
    pub io_write_bytes: u64,
    /// Executable name, when readable.
    pub name: Option<String>,
}

/// Reads live counters for a process.
pub trait ProcessInspector: Send + Sync {
    /// Returns counters for `pid`, or `None` if the process vanished or
    /// cannot be read.
    fn inspect(&self, pid: u32) -> Option<ProcessStats>;
}

/// Inspector backed by `/proc` through `sysinfo`.
///
/// CPU utilisation needs two readings; the inspector sleeps for `interval`
/// between them so the first sample is not a meaningless zero.
#[derive(Debug, Clone, Copy)]
pub struct SysinfoInspector {
    interval: Duration,
}

impl SysinfoInspector {
    /// Creates an inspector that measures CPU over `interval`.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl ProcessInspector for SysinfoInspector {
    fn inspect(&self, pid: u32) -> Option<ProcessStats> {
        let pid = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_cpu();
        if !system.refresh_process(pid) {
            tracing::debug!(%pid, "process not readable");
            return None;
        }
        std::thread::sleep(self.interval);
        system.refresh_cpu();
        if !system.refresh_process(pid) {
            tracing::debug!(%pid, "process vanished during sampling");
            return None;
        }

        let process = system.process(pid)?;
        let disk = process.disk_usage();
        Some(ProcessStats {
            cpu_percent: process.cpu_usage(),
            resident_bytes: process.memory(),
            io_read_bytes: disk.total_read_bytes,
            io_write_bytes: disk.total_written_bytes,
            name: Some(process.name().to_string()),
        })
    }
}

/// Returns whether `pid` is a member of the systemd unit `unit`.
///
/// Reads `/proc/<pid>/cgroup` and looks for `unit` as a path component, so
/// a pid recycled by an unrelated process is never mistaken for the unit's.
/// An unreadable or vanished process is not a member.
#[must_use]
pub fn belongs_to_unit(pid: u32, unit: &str) -> bool {
    if pid == 0 {
        return false;
    }
    std::fs::read_to_string(format!("/proc/{pid}/cgroup"))
        .is_ok_and(|contents| cgroup_names_unit(&contents, unit))
}

fn cgroup_names_unit(contents: &str, unit: &str) -> bool {
    contents
        .lines()
        .filter_map(|line| line.splitn(3, ':').nth(2))
        .any(|path| path.split('/').any(|component| component == unit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_is_matched_as_a_whole_path_component() {
        let system = "0::/system.slice/envbox-web-1a2b3c4d.service\n";
        assert!(cgroup_names_unit(system, "envbox-web-1a2b3c4d.service"));
        assert!(!cgroup_names_unit(system, "envbox-web-1a2b3c4d"));
        assert!(!cgroup_names_unit(system, "envbox-other-00000000.service"));

        let user = "0::/user.slice/user-1000.slice/user@1000.service/app.slice/envbox-j-00000001.service";
        assert!(cgroup_names_unit(user, "envbox-j-00000001.service"));

        let hybrid = "12:pids:/system.slice/sshd.service\n0::/system.slice/envbox-x-ffffffff.service";
        assert!(cgroup_names_unit(hybrid, "envbox-x-ffffffff.service"));
        assert!(!cgroup_names_unit("", "envbox-x-ffffffff.service"));
    }

    #[test]
    fn foreign_process_is_not_in_an_envbox_unit() {
        assert!(!belongs_to_unit(std::process::id(), "envbox-none-00000000.service"));
        assert!(!belongs_to_unit(0, "envbox-none-00000000.service"));
    }

    #[test]
    fn own_process_is_readable() {
        let stats = SysinfoInspector::new(Duration::from_millis(50))
            .inspect(std::process::id())
            .expect("self is readable");
        assert!(stats.resident_bytes > 0);
        assert!(stats.cpu_percent >= 0.0);
        assert!(stats.name.is_some());
    }

    #[test]
    fn missing_process_yields_none() {
        let mut child = std::process::Command::new("/bin/true")
            .spawn()
            .expect("spawn true");
        let pid = child.id();
        let _ = child.wait().expect("reap");
        assert!(SysinfoInspector::new(Duration::from_millis(10)).inspect(pid).is_none());
    }
}
