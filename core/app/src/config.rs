//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything the composition root needs to wire the system up.
///
/// Plain data with serde derives so it can come from a file, flags, or
/// env; no global state is read anywhere else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API root including any path prefix, e.g. `http://localhost:3000/api`.
    pub base_url: String,
    /// Directory holding the database, disk cache, and token file.
    pub data_dir: PathBuf,
    /// Extra attempts after a 5xx or timeout.
    pub retry_count: u32,
    /// Period of the background sync tick.
    pub sync_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("spendsync");
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            data_dir,
            retry_count: 1,
            sync_interval_secs: 300,
        }
    }
}

impl AppConfig {
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("spendsync.db")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    pub fn token_path(&self) -> PathBuf {
        self.data_dir.join("token.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths_live_under_data_dir() {
        let config = AppConfig {
            data_dir: PathBuf::from("/tmp/ss"),
            ..AppConfig::default()
        };
        assert_eq!(config.db_path(), PathBuf::from("/tmp/ss/spendsync.db"));
        assert_eq!(config.cache_dir(), PathBuf::from("/tmp/ss/cache"));
        assert_eq!(config.token_path(), PathBuf::from("/tmp/ss/token.json"));
    }
}
