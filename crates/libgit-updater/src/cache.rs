// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// cache keys are the md5 of the slug (the per-repo namespace) joined
/// with the request purpose, so one repo's entries can be cleared
/// without touching another's.
pub fn cache_key(slug: &str, purpose: &str) -> String {
    format!("{}-{purpose}", slug_prefix(slug))
}

/// per-repo key prefix, used to clear a single repo's namespace.
pub fn slug_prefix(slug: &str) -> String {
    format!("{:x}", md5::compute(slug.as_bytes()))
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    value: serde_json::Value,
    expires_at: u64,
}

/// key-value cache with explicit TTLs. `get` reports expiry instead of
/// silently dropping stale entries so callers can distinguish "never
/// fetched" from "fetched but stale".
pub trait CacheStore: Send + Sync {
    /// returns the stored value and whether it has expired.
    fn get(&self, key: &str) -> Option<(serde_json::Value, bool)>;

    fn set(&self, key: &str, value: serde_json::Value, ttl: Duration);

    fn remove(&self, key: &str);

    /// removes every entry whose key starts with `prefix`.
    fn clear_prefix(&self, prefix: &str);

    fn clear_all(&self);
}

/// in-memory store for one-shot runs and tests.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Option<(serde_json::Value, bool)> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        Some((entry.value.clone(), entry.expires_at <= now_secs()))
    }

    fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: now_secs().saturating_add(ttl.as_secs()),
        };
        self.entries.write().insert(key.to_string(), entry);
    }

    fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }

    fn clear_prefix(&self, prefix: &str) {
        self.entries.write().retain(|k, _| !k.starts_with(prefix));
    }

    fn clear_all(&self) {
        self.entries.write().clear();
    }
}

/// file-backed store, one JSON file per key under the cache directory.
/// survives across runs so repeated invocations within a TTL window skip
/// the network entirely.
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// default location under the user cache directory.
    pub fn default_dir() -> PathBuf {
        crate::paths::cache_home().join("git-updater")
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn read_entry(&self, key: &str) -> Option<CacheEntry> {
        let content = fs::read_to_string(self.entry_path(key)).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn iter_entry_files(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect()
    }
}

impl CacheStore for FileCache {
    fn get(&self, key: &str) -> Option<(serde_json::Value, bool)> {
        let entry = self.read_entry(key)?;
        Some((entry.value, entry.expires_at <= now_secs()))
    }

    fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: now_secs().saturating_add(ttl.as_secs()),
        };

        if let Err(e) = fs::create_dir_all(&self.dir) {
            log::warn!("**cache:** cannot create {}: {e}", self.dir.display());
            return;
        }

        match serde_json::to_string(&entry) {
            Ok(json) => {
                if let Err(e) = fs::write(self.entry_path(key), json) {
                    log::warn!("**cache:** write failed for {key}: {e}");
                }
            }
            Err(e) => log::warn!("**cache:** serialize failed for {key}: {e}"),
        }
    }

    fn remove(&self, key: &str) {
        fs::remove_file(self.entry_path(key)).ok();
    }

    fn clear_prefix(&self, prefix: &str) {
        for path in self.iter_entry_files() {
            let matches = path
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|stem| stem.starts_with(prefix));
            if matches {
                fs::remove_file(&path).ok();
            }
        }
    }

    fn clear_all(&self) {
        for path in self.iter_entry_files() {
            fs::remove_file(&path).ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_are_namespaced_per_slug() {
        let a = cache_key("widget", "tags");
        let b = cache_key("widget", "meta");
        let c = cache_key("other", "tags");

        assert_ne!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with(&slug_prefix("widget")));
        assert!(b.starts_with(&slug_prefix("widget")));
        assert!(!c.starts_with(&slug_prefix("widget")));
    }

    #[test]
    fn memory_cache_round_trip_and_expiry() {
        let cache = MemoryCache::new();
        let key = cache_key("widget", "tags");

        assert!(cache.get(&key).is_none());

        cache.set(&key, json!({"n": 1}), Duration::from_secs(60));
        let (value, expired) = cache.get(&key).unwrap();
        assert_eq!(value, json!({"n": 1}));
        assert!(!expired);

        cache.set(&key, json!({"n": 2}), Duration::from_secs(0));
        let (_, expired) = cache.get(&key).unwrap();
        assert!(expired);
    }

    #[test]
    fn memory_cache_clear_prefix_is_per_slug() {
        let cache = MemoryCache::new();
        cache.set(&cache_key("widget", "tags"), json!(1), Duration::from_secs(60));
        cache.set(&cache_key("widget", "meta"), json!(2), Duration::from_secs(60));
        cache.set(&cache_key("other", "tags"), json!(3), Duration::from_secs(60));

        cache.clear_prefix(&slug_prefix("widget"));

        assert!(cache.get(&cache_key("widget", "tags")).is_none());
        assert!(cache.get(&cache_key("widget", "meta")).is_none());
        assert!(cache.get(&cache_key("other", "tags")).is_some());
    }

    #[test]
    fn file_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        let key = cache_key("widget", "tags");

        assert!(cache.get(&key).is_none());
        cache.set(&key, json!(["1.0.0"]), Duration::from_secs(60));

        let (value, expired) = cache.get(&key).unwrap();
        assert_eq!(value, json!(["1.0.0"]));
        assert!(!expired);

        cache.remove(&key);
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn file_cache_clear_all() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        cache.set(&cache_key("a", "tags"), json!(1), Duration::from_secs(60));
        cache.set(&cache_key("b", "tags"), json!(2), Duration::from_secs(60));

        cache.clear_all();

        assert!(cache.get(&cache_key("a", "tags")).is_none());
        assert!(cache.get(&cache_key("b", "tags")).is_none());
    }
}
