//! The memory budget.

use parking_lot::Mutex;
use resync_codec::{MemoryFootprint, Table};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::config::{BudgetConfig, BYTES_PER_MB};
use crate::probe::{HostMemoryProbe, SysinfoProbe};
use crate::stats::{MemoryStats, ScopeUsage};

/// A registered dataset and its accounting metadata.
#[derive(Debug)]
pub struct DatasetRecord<D> {
    name: String,
    scope: String,
    size_bytes: u64,
    created_at: SystemTime,
    last_access_at: SystemTime,
    access_seq: u64,
    data: Arc<D>,
}

// Manual impl: cloning a record never requires `D: Clone`.
impl<D> Clone for DatasetRecord<D> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            scope: self.scope.clone(),
            size_bytes: self.size_bytes,
            created_at: self.created_at,
            last_access_at: self.last_access_at,
            access_seq: self.access_seq,
            data: Arc::clone(&self.data),
        }
    }
}

impl<D> DatasetRecord<D> {
    /// Unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Grouping tag.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Bytes charged against the budget.
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Registration time.
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Time of the last [`MemoryBudget::get`], or registration.
    pub fn last_access_at(&self) -> SystemTime {
        self.last_access_at
    }

    /// The dataset.
    pub fn data(&self) -> &Arc<D> {
        &self.data
    }
}

#[derive(Debug)]
struct BudgetState<D> {
    datasets: HashMap<String, DatasetRecord<D>>,
    current_usage_bytes: u64,
    peak_usage_bytes: u64,
    total_datasets: u64,
    freed_bytes: u64,
    cleanup_count: u64,
    last_cleanup: Option<SystemTime>,
    next_seq: u64,
}

impl<D> BudgetState<D> {
    fn new() -> Self {
        Self {
            datasets: HashMap::new(),
            current_usage_bytes: 0,
            peak_usage_bytes: 0,
            total_datasets: 0,
            freed_bytes: 0,
            cleanup_count: 0,
            last_cleanup: None,
            next_seq: 0,
        }
    }

    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn record_cleanup(&mut self, freed: u64) {
        self.freed_bytes = self.freed_bytes.saturating_add(freed);
        self.cleanup_count += 1;
        self.last_cleanup = Some(SystemTime::now());
    }

    fn remove(&mut self, name: &str) -> Option<DatasetRecord<D>> {
        let record = self.datasets.remove(name)?;
        self.current_usage_bytes = self.current_usage_bytes.saturating_sub(record.size_bytes);
        Some(record)
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(bytes: u64) -> f64 {
    bytes as f64
}

fn to_mb(bytes: u64) -> f64 {
    as_f64(bytes) / as_f64(BYTES_PER_MB)
}

/// A registry of named, scoped datasets kept under a byte ceiling.
///
/// Registration that would push usage over `max_bytes * cleanup_threshold`
/// first evicts the least recently accessed datasets until usage is at most
/// half of that threshold. A dataset that still would not fit under
/// `max_bytes` is refused and nothing changes.
///
/// Callers receive shared handles from [`MemoryBudget::get`]. Eviction drops
/// the budget's handle; the memory is released once callers drop theirs.
///
/// All operations serialize on a single lock.
pub struct MemoryBudget<D = Table> {
    config: BudgetConfig,
    probe: Option<Arc<dyn HostMemoryProbe>>,
    state: Mutex<BudgetState<D>>,
}

impl<D> fmt::Debug for MemoryBudget<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryBudget")
            .field("config", &self.config)
            .field("datasets", &state.datasets.len())
            .field("current_usage_bytes", &state.current_usage_bytes)
            .finish_non_exhaustive()
    }
}

impl<D: MemoryFootprint> MemoryBudget<D> {
    /// Creates a budget that reports host memory through `sysinfo`.
    pub fn new(config: BudgetConfig) -> Self {
        Self::with_probe(config, Some(Arc::new(SysinfoProbe::new())))
    }

    /// Creates a budget with a custom host probe, or none.
    pub fn with_probe(config: BudgetConfig, probe: Option<Arc<dyn HostMemoryProbe>>) -> Self {
        tracing::info!(
            max_memory_mb = config.max_memory_mb_f64(),
            cleanup_threshold = config.cleanup_threshold,
            "memory budget created"
        );
        Self {
            config,
            probe,
            state: Mutex::new(BudgetState::new()),
        }
    }

    /// The configuration in effect.
    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    /// Registers `dataset` under `name` in `scope`.
    ///
    /// Returns `false` if the dataset cannot fit under the ceiling even after
    /// eviction; the budget is then left unchanged. A dataset already
    /// registered under `name` is replaced only when the new one is admitted.
    pub fn register(&self, name: impl Into<String>, dataset: D, scope: impl Into<String>) -> bool {
        self.register_shared(name, Arc::new(dataset), scope)
    }

    /// Like [`MemoryBudget::register`] for a dataset that is already shared.
    pub fn register_shared(
        &self,
        name: impl Into<String>,
        dataset: Arc<D>,
        scope: impl Into<String>,
    ) -> bool {
        let name = name.into();
        let scope = scope.into();
        let size_bytes = dataset.footprint_bytes();

        let mut state = self.state.lock();
        let replaced_bytes = state.datasets.get(&name).map_or(0, |r| r.size_bytes);
        let usage_without = state.current_usage_bytes.saturating_sub(replaced_bytes);

        let over_threshold =
            as_f64(usage_without.saturating_add(size_bytes)) > self.config.threshold_bytes();
        let (victims, usage_after) = if over_threshold {
            self.plan_eviction(&state, &name, usage_without)
        } else {
            (Vec::new(), usage_without)
        };

        if usage_after.saturating_add(size_bytes) > self.config.max_bytes {
            tracing::warn!(
                name = %name,
                scope = %scope,
                size_mb = to_mb(size_bytes),
                current_usage_mb = to_mb(state.current_usage_bytes),
                max_memory_mb = self.config.max_memory_mb_f64(),
                "dataset refused: not enough memory"
            );
            return false;
        }

        if !victims.is_empty() {
            let mut freed = 0;
            for victim in &victims {
                if let Some(record) = state.remove(victim) {
                    freed += record.size_bytes;
                }
            }
            state.record_cleanup(freed);
            tracing::info!(
                evicted = victims.len(),
                freed_mb = to_mb(freed),
                current_usage_mb = to_mb(state.current_usage_bytes),
                "evicted least recently used datasets"
            );
        }

        state.remove(&name);
        let now = SystemTime::now();
        let access_seq = state.next_seq();
        state.datasets.insert(
            name.clone(),
            DatasetRecord {
                name: name.clone(),
                scope: scope.clone(),
                size_bytes,
                created_at: now,
                last_access_at: now,
                access_seq,
                data: dataset,
            },
        );
        state.current_usage_bytes += size_bytes;
        state.total_datasets += 1;
        state.peak_usage_bytes = state.peak_usage_bytes.max(state.current_usage_bytes);

        tracing::info!(
            name = %name,
            scope = %scope,
            size_mb = to_mb(size_bytes),
            current_usage_mb = to_mb(state.current_usage_bytes),
            max_memory_mb = self.config.max_memory_mb_f64(),
            "dataset registered"
        );
        true
    }

    /// Picks datasets to evict, oldest access first, until usage would be at
    /// or below the eviction target. `exclude` is the name being replaced.
    fn plan_eviction(
        &self,
        state: &BudgetState<D>,
        exclude: &str,
        mut usage: u64,
    ) -> (Vec<String>, u64) {
        let mut candidates: Vec<_> = state
            .datasets
            .values()
            .filter(|r| r.name != exclude)
            .map(|r| (r.access_seq, r.name.as_str(), r.size_bytes))
            .collect();
        candidates.sort_unstable_by_key(|(seq, _, _)| *seq);

        let target = self.config.eviction_target_bytes();
        let mut victims = Vec::new();
        for (_, name, size) in candidates {
            if as_f64(usage) <= target {
                break;
            }
            usage = usage.saturating_sub(size);
            victims.push(name.to_string());
        }
        (victims, usage)
    }
}

impl<D> MemoryBudget<D> {
    /// Returns the dataset registered under `name` and marks it as accessed.
    pub fn get(&self, name: &str) -> Option<Arc<D>> {
        let mut state = self.state.lock();
        let seq = state.next_seq();
        let record = state.datasets.get_mut(name)?;
        record.access_seq = seq;
        record.last_access_at = SystemTime::now();
        Some(Arc::clone(&record.data))
    }

    /// Whether `name` is registered. Does not count as an access.
    pub fn contains(&self, name: &str) -> bool {
        self.state.lock().datasets.contains_key(name)
    }

    /// Names registered under `scope`, sorted.
    pub fn names_in_scope(&self, scope: &str) -> Vec<String> {
        let state = self.state.lock();
        let mut names: Vec<_> = state
            .datasets
            .values()
            .filter(|r| r.scope == scope)
            .map(|r| r.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Snapshot of every registered dataset, least recently accessed first.
    pub fn records(&self) -> Vec<DatasetRecord<D>> {
        let state = self.state.lock();
        let mut records: Vec<_> = state.datasets.values().cloned().collect();
        records.sort_by_key(|r| r.access_seq);
        records
    }

    /// Number of registered datasets.
    pub fn len(&self) -> usize {
        self.state.lock().datasets.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Combined size of registered datasets.
    pub fn current_usage_bytes(&self) -> u64 {
        self.state.lock().current_usage_bytes
    }

    /// Removes every dataset in `scope` and returns the bytes freed.
    pub fn cleanup_scope(&self, scope: &str) -> u64 {
        let mut state = self.state.lock();
        let names: Vec<_> = state
            .datasets
            .values()
            .filter(|r| r.scope == scope)
            .map(|r| r.name.clone())
            .collect();

        let mut freed = 0;
        for name in &names {
            if let Some(record) = state.remove(name) {
                freed += record.size_bytes;
            }
        }
        state.record_cleanup(freed);

        if freed > 0 {
            tracing::info!(
                scope,
                datasets = names.len(),
                freed_mb = to_mb(freed),
                "scope released"
            );
        }
        freed
    }

    /// Removes every dataset and returns the bytes freed.
    pub fn cleanup_all(&self) -> u64 {
        let mut state = self.state.lock();
        let freed = state.current_usage_bytes;

        state.datasets.clear();
        state.datasets.shrink_to_fit();
        state.current_usage_bytes = 0;
        state.record_cleanup(freed);

        tracing::info!(freed_mb = to_mb(freed), "all datasets released");
        freed
    }

    /// Current statistics, including host memory when a probe is set.
    pub fn stats(&self) -> MemoryStats {
        let system = self.probe.as_ref().and_then(|p| p.sample());
        let state = self.state.lock();

        let mut by_scope: BTreeMap<String, (usize, u64)> = BTreeMap::new();
        for record in state.datasets.values() {
            let entry = by_scope.entry(record.scope.clone()).or_default();
            entry.0 += 1;
            entry.1 += record.size_bytes;
        }

        let max_memory_mb = self.config.max_memory_mb_f64();
        let current_usage_mb = to_mb(state.current_usage_bytes);
        MemoryStats {
            current_usage_mb,
            max_memory_mb,
            usage_percentage: if self.config.max_bytes == 0 {
                0.0
            } else {
                current_usage_mb / max_memory_mb * 100.0
            },
            peak_usage_mb: to_mb(state.peak_usage_bytes),
            total_datasets: state.total_datasets,
            active_datasets: state.datasets.len(),
            freed_memory_mb: to_mb(state.freed_bytes),
            cleanup_count: state.cleanup_count,
            seconds_since_cleanup: state.last_cleanup.map(|at| {
                SystemTime::now()
                    .duration_since(at)
                    .unwrap_or(Duration::ZERO)
                    .as_secs_f64()
            }),
            datasets_by_scope: by_scope
                .into_iter()
                .map(|(scope, (count, bytes))| {
                    (
                        scope,
                        ScopeUsage {
                            count,
                            size_mb: to_mb(bytes),
                        },
                    )
                })
                .collect(),
            system,
        }
    }

    /// Emits the current statistics as `info` events.
    pub fn log_summary(&self) {
        let stats = self.stats();
        tracing::info!(
            current_usage_mb = stats.current_usage_mb,
            max_memory_mb = stats.max_memory_mb,
            usage_percentage = stats.usage_percentage,
            peak_usage_mb = stats.peak_usage_mb,
            "memory usage"
        );
        tracing::info!(
            active = stats.active_datasets,
            registered = stats.total_datasets,
            freed_mb = stats.freed_memory_mb,
            cleanups = stats.cleanup_count,
            "memory datasets"
        );
        if let Some(host) = &stats.system {
            tracing::info!(
                memory_percentage = host.memory_percentage,
                process_memory_mb = host.process_memory_mb,
                "host memory"
            );
        }
        for (scope, usage) in &stats.datasets_by_scope {
            tracing::info!(
                scope = %scope,
                count = usage.count,
                size_mb = usage.size_mb,
                "memory scope"
            );
        }
    }
}
