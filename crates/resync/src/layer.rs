//! The composed resource layer.

use resync_cache::{BoundedCache, CacheKey, Value};
use resync_memory::MemoryBudget;
use resync_retry::{Classify, RetryExecutor};
use std::fmt;
use std::sync::Arc;

use crate::config::LayerConfig;
use crate::error::LayerResult;

/// What [`ResourceLayer::apply_cache_flags`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheFlagOutcome {
    /// Whether the whole cache was cleared.
    pub cleared: bool,
    /// Operation names whose entries were removed.
    pub invalidated: Vec<String>,
    /// Operation names that had no entry.
    pub missing: Vec<String>,
}

/// The cache, retry executor and memory budget of one synchronization run.
///
/// The three components are independent. The layer owns them and hands out
/// shared handles to the collaborators of a run.
pub struct ResourceLayer {
    config: LayerConfig,
    cache: Option<Arc<BoundedCache>>,
    retry: Arc<RetryExecutor>,
    memory: Arc<MemoryBudget>,
}

impl fmt::Debug for ResourceLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceLayer")
            .field("cache", &self.cache)
            .field("retry", &self.retry)
            .field("memory", &self.memory)
            .finish_non_exhaustive()
    }
}

impl ResourceLayer {
    /// Builds every component from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the cache
    /// directory cannot be created.
    pub fn from_config(config: &LayerConfig) -> LayerResult<Self> {
        config.validate()?;

        let cache = match config.cache_config() {
            Some(cache_config) => Some(Arc::new(BoundedCache::open(cache_config)?)),
            None => {
                tracing::info!("cache disabled");
                None
            }
        };
        let retry = Arc::new(RetryExecutor::new(config.retry_policy()));
        let memory = Arc::new(MemoryBudget::new(config.budget_config()));

        Ok(Self::from_parts(config.clone(), cache, retry, memory))
    }

    /// Assembles a layer from components built elsewhere.
    pub fn from_parts(
        config: LayerConfig,
        cache: Option<Arc<BoundedCache>>,
        retry: Arc<RetryExecutor>,
        memory: Arc<MemoryBudget>,
    ) -> Self {
        Self {
            config,
            cache,
            retry,
            memory,
        }
    }

    /// The configuration the layer was built from.
    pub fn config(&self) -> &LayerConfig {
        &self.config
    }

    /// The cache, unless disabled.
    pub fn cache(&self) -> Option<Arc<BoundedCache>> {
        self.cache.clone()
    }

    /// The retry executor.
    pub fn retry(&self) -> Arc<RetryExecutor> {
        Arc::clone(&self.retry)
    }

    /// The memory budget.
    pub fn memory(&self) -> Arc<MemoryBudget> {
        Arc::clone(&self.memory)
    }

    /// Applies the command-line cache flags: `clear` empties the cache, then
    /// each name in `invalidate` drops the entry of that argument-less
    /// operation.
    pub fn apply_cache_flags<S: AsRef<str>>(&self, clear: bool, invalidate: &[S]) -> CacheFlagOutcome {
        let mut outcome = CacheFlagOutcome::default();
        let Some(cache) = &self.cache else {
            if clear || !invalidate.is_empty() {
                tracing::warn!("cache flags ignored: cache disabled");
            }
            return outcome;
        };

        if clear {
            cache.clear();
            outcome.cleared = true;
        }
        for name in invalidate {
            let name = name.as_ref();
            if cache.invalidate(&CacheKey::operation(name)) {
                outcome.invalidated.push(name.to_string());
            } else {
                outcome.missing.push(name.to_string());
            }
        }
        if !outcome.invalidated.is_empty() {
            tracing::info!(names = ?outcome.invalidated, "cache entries invalidated");
        }
        outcome
    }

    /// Returns the cached value of `key`, or runs `fetch` under the retry
    /// executor and caches its result.
    ///
    /// The retry metrics are recorded under the key's operation name.
    ///
    /// # Errors
    ///
    /// Returns the error of `fetch` once retries are exhausted or the error
    /// is fatal. Nothing is cached in that case.
    pub fn fetch<E, F>(&self, key: &CacheKey, fetch: F) -> Result<Value, E>
    where
        F: FnMut() -> Result<Value, E>,
        E: Classify + fmt::Display,
    {
        if let Some(value) = self.cache.as_ref().and_then(|c| c.get(key)) {
            return Ok(value);
        }
        let value = self.retry.execute(key.operation_name(), fetch)?;
        if let Some(cache) = &self.cache {
            cache.set(key, value.clone());
        }
        Ok(value)
    }

    /// Renders cache, memory and retry statistics.
    pub fn report(&self) -> String {
        let cache = match &self.cache {
            Some(cache) => cache.stats_text(),
            None => "Cache disabled".to_string(),
        };
        format!(
            "{cache}\n{}\n{}",
            self.memory.stats(),
            self.retry.summary()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resync_cache::{cache_key, CacheConfig, ManualClock};
    use resync_memory::BudgetConfig;
    use resync_retry::{ErrorKind, OperationError, RecordingSleeper, RetryPolicy};

    fn layer(with_cache: bool) -> ResourceLayer {
        let cache = with_cache.then(|| {
            Arc::new(
                BoundedCache::open_with_clock(
                    CacheConfig::default().in_memory(),
                    Arc::new(ManualClock::default()),
                )
                .unwrap(),
            )
        });
        let retry = Arc::new(RetryExecutor::with_sleeper(
            RetryPolicy::new(3).with_jitter(false),
            Arc::new(RecordingSleeper::new()),
        ));
        let memory = Arc::new(MemoryBudget::with_probe(BudgetConfig::default(), None));
        ResourceLayer::from_parts(LayerConfig::default(), cache, retry, memory)
    }

    #[test]
    fn flags_clear_then_invalidate() {
        let layer = layer(true);
        let cache = layer.cache().unwrap();
        cache.set(&CacheKey::operation("users"), Value::Integer(1));
        cache.set(&CacheKey::operation("axes"), Value::Integer(2));

        let outcome = layer.apply_cache_flags(false, &["users", "projects"]);
        assert!(!outcome.cleared);
        assert_eq!(outcome.invalidated, vec!["users"]);
        assert_eq!(outcome.missing, vec!["projects"]);
        assert_eq!(cache.len(), 1);

        let outcome = layer.apply_cache_flags::<&str>(true, &[]);
        assert!(outcome.cleared);
        assert!(cache.is_empty());
    }

    #[test]
    fn flags_without_cache_do_nothing() {
        let layer = layer(false);
        assert!(layer.cache().is_none());
        assert_eq!(
            layer.apply_cache_flags(true, &["users"]),
            CacheFlagOutcome::default()
        );
    }

    #[test]
    fn fetch_retries_then_caches() {
        let layer = layer(true);
        let key = cache_key!("remote_users", "prod");
        let mut calls = 0;

        let value = layer
            .fetch(&key, || {
                calls += 1;
                if calls == 1 {
                    Err(OperationError::new(ErrorKind::Timeout, "slow"))
                } else {
                    Ok(Value::from("payload"))
                }
            })
            .unwrap();
        assert_eq!(value, Value::from("payload"));
        assert_eq!(calls, 2);

        let again = layer
            .fetch::<OperationError, _>(&key, || panic!("must be served from cache"))
            .unwrap();
        assert_eq!(again, value);

        let metrics = layer.retry().metrics("remote_users").unwrap();
        assert_eq!(metrics.total_attempts, 2);
    }

    #[test]
    fn fetch_failure_is_not_cached() {
        let layer = layer(true);
        let key = cache_key!("remote_projects");
        let err = layer
            .fetch(&key, || Err::<Value, _>(OperationError::fatal("denied")))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Fatal);
        assert!(!layer.cache().unwrap().contains(&key));
    }

    #[test]
    fn report_has_three_sections() {
        let report = layer(false).report();
        assert!(report.starts_with("Cache disabled"));
        assert!(report.contains("Memory Summary:"));
        assert!(report.contains("No retry metrics recorded."));
    }
}
