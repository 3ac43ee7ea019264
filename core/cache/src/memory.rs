//! Capacity-bounded in-memory cache tier with per-entry TTL.

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// Default TTL for general-purpose entries.
pub const DEFAULT_TTL_SECS: i64 = 300;
/// Shorter TTL for list-query responses, which churn faster.
pub const LIST_TTL_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct Entry {
    payload: Vec<u8>,
    expires_at: DateTime<Utc>,
    inserted_at: DateTime<Utc>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// In-memory cache tier.
///
/// Values are stored as serialized JSON so the byte budget measures real
/// payload size. Expired entries are evicted lazily when read, not swept
/// proactively; capacity pressure evicts oldest-inserted entries first.
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
    max_entries: usize,
    max_bytes: usize,
}

impl MemoryCache {
    /// Create a cache with the default bounds (100 entries, 50 MB).
    pub fn new() -> Self {
        Self::with_limits(100, 50 * 1024 * 1024)
    }

    /// Create a cache with explicit bounds.
    pub fn with_limits(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries,
            max_bytes,
        }
    }

    /// Store a value under `key` with the given TTL in seconds.
    ///
    /// Serialization failures drop the entry with a log line; a cache that
    /// cannot hold a value behaves as a miss, never as an error.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl_secs: i64) {
        let payload = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(key, error = %e, "failed to serialize cache entry, skipping");
                return;
            }
        };

        let now = Utc::now();
        let entry = Entry {
            payload,
            expires_at: now + Duration::seconds(ttl_secs),
            inserted_at: now,
        };

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), entry);
        Self::enforce_limits(&mut entries, self.max_entries, self.max_bytes);
    }

    /// Fetch a value, evicting it lazily if expired.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let now = Utc::now();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());

        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => serde_json::from_slice(&entry.payload).ok(),
            None => None,
        }
    }

    pub fn remove(&self, key: &str) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Number of live entries (expired-but-unswept entries included).
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn enforce_limits(entries: &mut HashMap<String, Entry>, max_entries: usize, max_bytes: usize) {
        let total_bytes = |map: &HashMap<String, Entry>| {
            map.values().map(|e| e.payload.len()).sum::<usize>()
        };

        while entries.len() > max_entries || total_bytes(entries) > max_bytes {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    debug!(key, "evicting cache entry over capacity");
                    entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get() {
        let cache = MemoryCache::new();
        cache.set("k", &vec![1, 2, 3], DEFAULT_TTL_SECS);
        assert_eq!(cache.get::<Vec<i32>>("k"), Some(vec![1, 2, 3]));
    }

    #[test]
    fn miss_on_absent_key() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get::<String>("nope"), None);
    }

    #[test]
    fn expired_entry_is_evicted_on_read() {
        let cache = MemoryCache::new();
        cache.set("k", &"v".to_string(), -1);
        assert_eq!(cache.get::<String>("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn entry_cap_evicts_oldest() {
        let cache = MemoryCache::with_limits(2, usize::MAX);
        cache.set("a", &1, DEFAULT_TTL_SECS);
        cache.set("b", &2, DEFAULT_TTL_SECS);
        cache.set("c", &3, DEFAULT_TTL_SECS);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get::<i32>("c"), Some(3));
    }

    #[test]
    fn byte_budget_evicts() {
        let cache = MemoryCache::with_limits(100, 16);
        cache.set("big", &"aaaaaaaaaaaaaaaa".to_string(), DEFAULT_TTL_SECS);
        cache.set("small", &1, DEFAULT_TTL_SECS);
        // The oversized payload got evicted to fit the budget.
        assert_eq!(cache.get::<String>("big"), None);
        assert_eq!(cache.get::<i32>("small"), Some(1));
    }

    #[test]
    fn remove_and_clear() {
        let cache = MemoryCache::new();
        cache.set("a", &1, DEFAULT_TTL_SECS);
        cache.set("b", &2, DEFAULT_TTL_SECS);

        cache.remove("a");
        assert_eq!(cache.get::<i32>("a"), None);

        cache.clear();
        assert!(cache.is_empty());
    }
}
