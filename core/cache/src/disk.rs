//! JSON-file disk cache tier.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use spendsync_common::{Error, Result};

/// Disk cache tier.
///
/// One JSON file per key in a dedicated cache directory. No TTL is
/// enforced here: consumers invalidate keys explicitly after mutations.
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    /// Create a disk cache rooted at `dir`, creating it if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are internal identifiers like "expenses_Food"; strip anything
        // that could escape the cache directory.
        let safe: String = key
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }

    /// Persist a value under `key`.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let payload = serde_json::to_vec(value)
            .map_err(|e| Error::InvalidRequest(format!("failed to encode cache entry: {e}")))?;
        fs::write(self.path_for(key), payload).await?;
        Ok(())
    }

    /// Fetch a value; any read or decode failure is a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = fs::read(self.path_for(key)).await.ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(key, error = %e, "corrupt disk cache entry treated as miss");
                None
            }
        }
    }

    /// Remove a single entry. Absent entries are not an error.
    pub async fn remove(&self, key: &str) {
        let _ = fs::remove_file(self.path_for(key)).await;
    }

    /// Wipe the cache directory and recreate it empty.
    pub async fn clear(&self) -> Result<()> {
        if fs::metadata(&self.dir).await.is_ok() {
            fs::remove_dir_all(&self.dir).await?;
        }
        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }
}
