//! Budget statistics snapshots.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::probe::HostMemory;

/// Datasets held under one scope.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ScopeUsage {
    /// Number of datasets.
    pub count: usize,
    /// Their combined size.
    pub size_mb: f64,
}

/// A point-in-time view of a [`crate::MemoryBudget`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryStats {
    /// Combined size of registered datasets.
    pub current_usage_mb: f64,
    /// Configured ceiling.
    pub max_memory_mb: f64,
    /// `current_usage_mb / max_memory_mb`, in percent.
    pub usage_percentage: f64,
    /// Highest usage reached.
    pub peak_usage_mb: f64,
    /// Successful registrations since creation.
    pub total_datasets: u64,
    /// Datasets currently registered.
    pub active_datasets: usize,
    /// Bytes released by eviction and cleanups, in megabytes.
    pub freed_memory_mb: f64,
    /// Evictions plus explicit cleanups.
    pub cleanup_count: u64,
    /// Seconds since the last eviction or cleanup.
    pub seconds_since_cleanup: Option<f64>,
    /// Per-scope breakdown.
    pub datasets_by_scope: BTreeMap<String, ScopeUsage>,
    /// Host figures, when a probe is configured and the host exposes them.
    pub system: Option<HostMemory>,
}

impl fmt::Display for MemoryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Memory Summary:")?;
        writeln!(
            f,
            "  Usage: {:.1} MB / {:.0} MB ({:.1}%)",
            self.current_usage_mb, self.max_memory_mb, self.usage_percentage
        )?;
        writeln!(f, "  Peak: {:.1} MB", self.peak_usage_mb)?;
        writeln!(
            f,
            "  Datasets: {} active / {} registered",
            self.active_datasets, self.total_datasets
        )?;
        write!(
            f,
            "  Freed: {:.1} MB ({} cleanups)",
            self.freed_memory_mb, self.cleanup_count
        )?;
        if let Some(host) = &self.system {
            write!(f, "\n  System memory: {:.1}% used", host.memory_percentage)?;
            if let Some(process) = host.process_memory_mb {
                write!(f, "\n  Process: {process:.1} MB")?;
            }
        }
        if !self.datasets_by_scope.is_empty() {
            write!(f, "\n  By scope:")?;
            for (scope, usage) in &self.datasets_by_scope {
                write!(
                    f,
                    "\n    {scope}: {} datasets, {:.1} MB",
                    usage.count, usage.size_mb
                )?;
            }
        }
        Ok(())
    }
}
