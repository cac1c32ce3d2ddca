use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const CACHE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry<V> {
    value: V,
    stored_at: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile<V> {
    version: u32,
    entries: HashMap<String, CacheEntry<V>>,
}

/// Bounded key/value cache whose entries expire after a fixed TTL.
///
/// Shared between render workers; the last write for a key wins.
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    capacity: usize,
    ttl_secs: u64,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            ttl_secs: ttl.as_secs(),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = now_secs();
        let mut guard = self.lock();
        match guard.get(key) {
            Some(entry) if self.is_fresh(entry, now) => Some(entry.value.clone()),
            Some(_) => {
                guard.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        let now = now_secs();
        let key = key.into();
        let mut guard = self.lock();
        if !guard.contains_key(&key) && guard.len() >= self.capacity {
            guard.retain(|_, entry| now.saturating_sub(entry.stored_at) < self.ttl_secs);
            if guard.len() >= self.capacity
                && let Some(oldest) = guard
                    .iter()
                    .min_by_key(|(_, entry)| entry.stored_at)
                    .map(|(k, _)| k.clone())
            {
                guard.remove(&oldest);
            }
        }
        guard.insert(
            key,
            CacheEntry {
                value,
                stored_at: now,
            },
        );
    }

    /// Cached value or the result of `fetch`. `None` results are not stored
    /// so a later call can retry the lookup.
    pub fn get_or_fetch(&self, key: &str, fetch: impl FnOnce() -> Option<V>) -> Option<V> {
        if let Some(hit) = self.get(key) {
            return Some(hit);
        }
        let value = fetch()?;
        self.insert(key, value.clone());
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_fresh(&self, entry: &CacheEntry<V>, now: u64) -> bool {
        now.saturating_sub(entry.stored_at) < self.ttl_secs
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<V: Clone + Serialize + DeserializeOwned> TtlCache<V> {
    /// Seed the cache from a file written by [`TtlCache::save`]. A missing,
    /// unreadable or outdated file leaves the cache empty.
    pub fn load(&self, path: &Path) {
        let Ok(raw) = fs::read_to_string(path) else {
            return;
        };
        let Ok(file) = serde_json::from_str::<CacheFile<V>>(&raw) else {
            tracing::debug!("ignoring unreadable cache file {}", path.display());
            return;
        };
        if file.version != CACHE_VERSION {
            return;
        }
        let now = now_secs();
        let mut guard = self.lock();
        for (key, entry) in file.entries {
            if guard.len() >= self.capacity {
                break;
            }
            if self.is_fresh(&entry, now) {
                guard.insert(key, entry);
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = CacheFile {
            version: CACHE_VERSION,
            entries: self.lock().clone(),
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).ok();
        }
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string(&file).context("serialize asset cache")?;
        fs::write(&tmp, json).context("write asset cache")?;
        fs::rename(&tmp, path).context("swap asset cache")?;
        Ok(())
    }
}

/// Default cache location: `$XDG_CACHE_HOME/card_forge` or `~/.cache/card_forge`.
pub fn default_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join("card_forge"));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join("card_forge"))
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_evicts_oldest() {
        let cache = TtlCache::new(2, Duration::from_secs(600));
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("c", 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("c"), Some(3));
    }

    #[test]
    fn zero_ttl_never_hits() {
        let cache = TtlCache::new(4, Duration::ZERO);
        cache.insert("a", "x".to_string());
        assert_eq!(cache.get("a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn misses_are_not_cached() {
        let cache: TtlCache<String> = TtlCache::new(4, Duration::from_secs(600));
        assert_eq!(cache.get_or_fetch("k", || None), None);
        assert_eq!(
            cache.get_or_fetch("k", || Some("v".into())),
            Some("v".to_string())
        );
        assert_eq!(cache.get_or_fetch("k", || None), Some("v".to_string()));
    }

    #[test]
    fn survives_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let cache = TtlCache::new(4, Duration::from_secs(600));
        cache.insert("team", "https://example.test/team".to_string());
        cache.save(&path).unwrap();

        let fresh: TtlCache<String> = TtlCache::new(4, Duration::from_secs(600));
        fresh.load(&path);
        assert_eq!(fresh.get("team").as_deref(), Some("https://example.test/team"));
    }
}
