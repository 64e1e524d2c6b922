//! # Resync Cache
//!
//! A bounded, optionally durable memo cache for idempotent operations.
//!
//! Results are stored under a [`CacheKey`] derived from an operation name and
//! its arguments. Entries expire after a time-to-live, and the cache keeps its
//! total size under a ceiling by evicting the least-recently-accessed entries.
//! With [`Persistence::Directory`] every entry is mirrored to a record file so
//! the cache survives restarts.
//!
//! Capacity, expiry and serialization problems never surface as errors:
//! they are logged and reported as misses.
//!
//! ## Example
//!
//! ```rust
//! use resync_cache::{cache_key, BoundedCache, CacheConfig};
//! use resync_codec::{Table, Value};
//! use std::time::Duration;
//!
//! let cache = BoundedCache::open(CacheConfig::default().max_size_mb(10)).unwrap();
//!
//! let users = Table::new(["email"]).with_row(vec!["a@corp.fr".into()]).unwrap();
//! let key = cache_key!("remote_users", "prod");
//! cache.set_with_ttl(&key, users.to_value(), Some(Duration::from_secs(600)));
//!
//! let cached = cache.get(&key).unwrap();
//! assert_eq!(Table::from_value(&cached).unwrap(), users);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod clock;
mod config;
mod error;
mod key;
mod record;
mod stats;

pub use cache::{BoundedCache, CacheEntry, RecordInfo};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    CacheConfig, Persistence, BYTES_PER_MB, DEFAULT_MAX_SIZE_MB, DEFAULT_TTL,
    EVICTION_TARGET_RATIO,
};
pub use error::{CacheError, CacheResult};
pub use key::CacheKey;
pub use record::CacheRecord;
pub use resync_codec::Value;
pub use stats::{CacheMetrics, CacheStats};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    enum Op {
        Set(u8, usize),
        Get(u8),
        Invalidate(u8),
        Advance(u64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..8, 0usize..4096).prop_map(|(k, n)| Op::Set(k, n)),
            (0u8..8).prop_map(Op::Get),
            (0u8..8).prop_map(Op::Invalidate),
            (0u64..20).prop_map(Op::Advance),
        ]
    }

    proptest! {
        #[test]
        fn total_size_matches_live_entries(ops in prop::collection::vec(op(), 1..80)) {
            let clock = Arc::new(ManualClock::default());
            let config = CacheConfig::default()
                .max_size_bytes(16 * 1024)
                .default_ttl(Some(std::time::Duration::from_secs(30)));
            let cache = BoundedCache::open_with_clock(config, clock.clone()).unwrap();

            for op in ops {
                match op {
                    Op::Set(k, n) => cache.set(&cache_key!("op", u32::from(k)), Value::Bytes(vec![0; n])),
                    Op::Get(k) => { cache.get(&cache_key!("op", u32::from(k))); }
                    Op::Invalidate(k) => { cache.invalidate(&cache_key!("op", u32::from(k))); }
                    Op::Advance(s) => clock.advance(std::time::Duration::from_secs(s)),
                }

                let sum: u64 = (0u32..8)
                    .filter_map(|k| cache.peek(&cache_key!("op", k)))
                    .map(|e| e.size_bytes())
                    .sum();
                prop_assert_eq!(sum, cache.total_size_bytes());
            }

            let m = cache.metrics();
            prop_assert!(m.hit_rate >= 0.0 && m.hit_rate <= 1.0);
        }
    }
}
