//! Two-tier response cache for SpendSync.
//!
//! Short-lived memory tier plus an explicitly invalidated disk tier. This
//! is a read-through helper, not a write-through cache: writes to the
//! store or server do not update entries — consumers invalidate affected
//! keys after a mutation.

pub mod disk;
pub mod memory;

pub use disk::DiskCache;
pub use memory::{MemoryCache, DEFAULT_TTL_SECS, LIST_TTL_SECS};

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

use spendsync_common::Result;

/// Cache key for a category-filtered expense list.
pub fn expenses_key(category: Option<&str>) -> String {
    format!("expenses_{}", category.unwrap_or("all"))
}

/// Facade over both cache tiers.
pub struct CacheLayer {
    memory: MemoryCache,
    disk: DiskCache,
}

impl CacheLayer {
    /// Create a cache layer with default memory bounds, backed by `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            memory: MemoryCache::new(),
            disk: DiskCache::new(dir)?,
        })
    }

    pub fn set_memory<T: Serialize>(&self, key: &str, value: &T, ttl_secs: i64) {
        self.memory.set(key, value, ttl_secs);
    }

    pub fn get_memory<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.memory.get(key)
    }

    pub async fn set_disk<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.disk.set(key, value).await
    }

    pub async fn get_disk<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.disk.get(key).await
    }

    /// Remove a key from both tiers.
    pub async fn invalidate(&self, key: &str) {
        self.memory.remove(key);
        self.disk.remove(key).await;
    }

    /// Wipe both tiers entirely. Used on logout.
    pub async fn clear_all(&self) -> Result<()> {
        self.memory.clear();
        self.disk.clear().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_cache_keys() {
        assert_eq!(expenses_key(None), "expenses_all");
        assert_eq!(expenses_key(Some("Food")), "expenses_Food");
    }

    #[tokio::test]
    async fn invalidate_clears_both_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheLayer::new(dir.path().join("cache")).unwrap();

        cache.set_memory("k", &1, DEFAULT_TTL_SECS);
        cache.set_disk("k", &1).await.unwrap();

        cache.invalidate("k").await;

        assert_eq!(cache.get_memory::<i32>("k"), None);
        assert_eq!(cache.get_disk::<i32>("k").await, None);
    }

    #[tokio::test]
    async fn clear_all_wipes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheLayer::new(dir.path().join("cache")).unwrap();

        cache.set_memory("a", &1, DEFAULT_TTL_SECS);
        cache.set_disk("b", &2).await.unwrap();

        cache.clear_all().await.unwrap();

        assert_eq!(cache.get_memory::<i32>("a"), None);
        assert_eq!(cache.get_disk::<i32>("b").await, None);
    }
}
