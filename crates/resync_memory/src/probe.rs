//! Host memory figures reported alongside budget statistics.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use sysinfo::{Pid, System};

use crate::config::BYTES_PER_MB;

/// System and process memory at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostMemory {
    /// Physical memory of the host.
    pub total_memory_mb: f64,
    /// Memory available for new allocations.
    pub available_memory_mb: f64,
    /// Share of physical memory in use, in percent.
    pub memory_percentage: f64,
    /// Resident size of this process, if it could be read.
    pub process_memory_mb: Option<f64>,
}

/// Source of [`HostMemory`] samples.
pub trait HostMemoryProbe: Send + Sync + fmt::Debug {
    /// Takes a sample. `None` when the host figures are unavailable.
    fn sample(&self) -> Option<HostMemory>;
}

/// Reads host memory through `sysinfo`.
pub struct SysinfoProbe {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl SysinfoProbe {
    /// Creates a probe for the current process.
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(reason) => {
                tracing::debug!(reason, "process memory unavailable");
                None
            }
        };
        Self {
            system: Mutex::new(System::new()),
            pid,
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SysinfoProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SysinfoProbe")
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

#[allow(clippy::cast_precision_loss)]
fn to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB as f64
}

impl HostMemoryProbe for SysinfoProbe {
    #[allow(clippy::cast_precision_loss)]
    fn sample(&self) -> Option<HostMemory> {
        let mut system = self.system.lock();
        system.refresh_memory();

        let total = system.total_memory();
        if total == 0 {
            return None;
        }
        let available = system.available_memory();
        let used = total.saturating_sub(available);

        let process_memory_mb = self.pid.and_then(|pid| {
            if system.refresh_process(pid) {
                system.process(pid).map(|p| to_mb(p.memory()))
            } else {
                None
            }
        });

        Some(HostMemory {
            total_memory_mb: to_mb(total),
            available_memory_mb: to_mb(available),
            memory_percentage: used as f64 / total as f64 * 100.0,
            process_memory_mb,
        })
    }
}
