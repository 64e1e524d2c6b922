//! Cache maintenance commands.
//!
//! Every command opens the durable cache described by the configuration,
//! which loads the live records into memory. Expired records stay on disk
//! until `cache purge` or a later lookup removes them.

use resync::{LayerConfig, ResourceLayer};
use resync_cache::{BoundedCache, RecordInfo};
use std::io::Write;
use std::sync::Arc;

use super::{CommandResult, OutputFormat};

/// Builds the layer and returns it with its persistent cache.
fn open(config: &LayerConfig) -> Result<(ResourceLayer, Arc<BoundedCache>), Box<dyn std::error::Error>> {
    let layer = ResourceLayer::from_config(config)?;
    let cache = layer
        .cache()
        .ok_or("cache is disabled in the configuration")?;
    if !cache.is_persistent() {
        return Err("cache persistence is disabled in the configuration".into());
    }
    Ok((layer, cache))
}

/// Prints cache metrics.
pub fn stats(config: &LayerConfig, format: OutputFormat, out: &mut dyn Write) -> CommandResult {
    let (_, cache) = open(config)?;
    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&cache.metrics())?)?,
        OutputFormat::Text => writeln!(out, "{}", cache.stats_text())?,
    }
    Ok(())
}

/// Removes every entry and record.
pub fn clear(config: &LayerConfig, out: &mut dyn Write) -> CommandResult {
    let (layer, cache) = open(config)?;
    let entries = cache.len();
    layer.apply_cache_flags::<&str>(true, &[]);
    writeln!(out, "Cleared {entries} cache entries")?;
    Ok(())
}

/// Removes the entries of argument-less operations by name.
pub fn invalidate(config: &LayerConfig, names: &[String], out: &mut dyn Write) -> CommandResult {
    let (layer, _) = open(config)?;
    let outcome = layer.apply_cache_flags(false, names);
    for name in &outcome.invalidated {
        writeln!(out, "invalidated {name}")?;
    }
    for name in &outcome.missing {
        writeln!(out, "not cached  {name}")?;
    }
    Ok(())
}

/// Removes expired entries and records.
pub fn purge(config: &LayerConfig, out: &mut dyn Write) -> CommandResult {
    let (_, cache) = open(config)?;
    let removed = cache.purge_expired();
    writeln!(out, "Purged {removed} expired cache entries")?;
    Ok(())
}

/// Lists every durable record.
pub fn inspect(config: &LayerConfig, format: OutputFormat, out: &mut dyn Write) -> CommandResult {
    let (_, cache) = open(config)?;
    let records = cache.inspect_records()?;
    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&records)?)?,
        OutputFormat::Text => print_records(&records, out)?,
    }
    Ok(())
}

fn print_records(records: &[RecordInfo], out: &mut dyn Write) -> std::io::Result<()> {
    if records.is_empty() {
        return writeln!(out, "No cache records");
    }
    writeln!(out, "{:<64}  {:>10}  {:>10}  {:>8}  STATE", "KEY", "SIZE", "AGE", "TTL")?;
    for record in records {
        if !record.readable {
            writeln!(out, "{:<64}  {:>10}  {:>10}  {:>8}  unreadable", record.key, "-", "-", "-")?;
            continue;
        }
        let size = record.size_bytes.map_or_else(|| "-".to_string(), |s| s.to_string());
        let age = record
            .age_secs
            .map_or_else(|| "-".to_string(), |a| format!("{a:.0}s"));
        let ttl = record
            .ttl_secs
            .map_or_else(|| "never".to_string(), |t| format!("{t}s"));
        let state = if record.expired { "expired" } else { "live" };
        writeln!(out, "{:<64}  {size:>10}  {age:>10}  {ttl:>8}  {state}", record.key)?;
    }
    writeln!(out, "{} records", records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use resync_cache::{cache_key, CacheKey, Value};
    use resync_testkit::TestCacheDir;
    use std::time::Duration;

    fn config_for(dir: &TestCacheDir) -> LayerConfig {
        let mut config = LayerConfig::default();
        config.cache.directory = dir.path().to_path_buf();
        config
    }

    /// Fixture caches run on a fixed clock; records must not expire when the
    /// command reopens them on the system clock.
    fn open_fixture(dir: &TestCacheDir) -> resync_cache::BoundedCache {
        dir.open(dir.config().default_ttl(None))
    }

    fn run(f: impl FnOnce(&mut Vec<u8>) -> CommandResult) -> String {
        let mut out = Vec::new();
        f(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn stats_reports_warmed_entries() {
        let dir = TestCacheDir::new();
        open_fixture(&dir)
            .set(&cache_key!("remote_users"), Value::from("x"));
        let config = config_for(&dir);

        let text = run(|out| stats(&config, OutputFormat::Text, out));
        assert!(text.contains("Entries: 1"));

        let json = run(|out| stats(&config, OutputFormat::Json, out));
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["entry_count"], 1);
    }

    #[test]
    fn invalidate_reports_each_name() {
        let dir = TestCacheDir::new();
        open_fixture(&dir)
            .set(&CacheKey::operation("remote_users"), Value::Integer(1));
        let config = config_for(&dir);

        let names = vec!["remote_users".to_string(), "remote_axes".to_string()];
        let text = run(|out| invalidate(&config, &names, out));
        assert!(text.contains("invalidated remote_users"));
        assert!(text.contains("not cached  remote_axes"));
        assert!(dir.record_digests().is_empty());
    }

    #[test]
    fn clear_and_inspect() {
        let dir = TestCacheDir::new();
        let cache = open_fixture(&dir);
        cache.set(&cache_key!("a"), Value::Integer(1));
        cache.set(&cache_key!("b"), Value::Null);
        dir.write_raw_record("broken", b"\x00");
        drop(cache);
        let config = config_for(&dir);

        let text = run(|out| inspect(&config, OutputFormat::Text, out));
        assert!(text.contains("unreadable"));
        assert!(text.contains("3 records"));

        let text = run(|out| clear(&config, out));
        assert!(text.starts_with("Cleared 2 cache entries"));
        assert!(dir.record_digests().is_empty());

        let text = run(|out| inspect(&config, OutputFormat::Text, out));
        assert_eq!(text.trim(), "No cache records");
    }

    #[test]
    fn expired_records_stay_until_purged() {
        let dir = TestCacheDir::new();
        // One second on the fixture clock is long past on the system clock.
        dir.open(dir.config()).set_with_ttl(
            &cache_key!("stale"),
            Value::from("old"),
            Some(Duration::from_secs(1)),
        );
        let config = config_for(&dir);

        let text = run(|out| inspect(&config, OutputFormat::Text, out));
        assert!(text.contains("expired"));
        assert!(text.contains("1 records"));
        let text = run(|out| stats(&config, OutputFormat::Text, out));
        assert!(text.contains("Entries: 0"));
        assert_eq!(dir.record_digests().len(), 1);

        let text = run(|out| purge(&config, out));
        assert!(text.starts_with("Purged 1 expired cache entries"));
        assert!(dir.record_digests().is_empty());
    }

    #[test]
    fn disabled_cache_is_an_error() {
        let mut config = LayerConfig::default();
        config.cache.enabled = false;
        let mut out = Vec::new();
        assert!(purge(&config, &mut out).is_err());

        config.cache.enabled = true;
        config.cache.persist = false;
        assert!(purge(&config, &mut out).is_err());
    }
}
