//! Bearer token persistence.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::{debug, warn};

use spendsync_common::Result;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedToken {
    token: String,
}

/// Opaque bearer-token store.
///
/// The in-process copy lives behind an RwLock so concurrent requests never
/// see a torn read mid-update. When backed by a file, the token survives
/// process restarts; the transport clears it on a 401, which forces
/// re-authentication.
pub struct TokenStore {
    path: Option<PathBuf>,
    token: RwLock<Option<String>>,
}

impl TokenStore {
    /// Ephemeral store, nothing persisted. Used by tests.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            token: RwLock::new(None),
        }
    }

    /// File-backed store; loads any previously persisted token.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let token = std::fs::read(&path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<PersistedToken>(&bytes).ok())
            .map(|p| p.token);
        if token.is_some() {
            debug!("loaded persisted auth token");
        }
        Self {
            path: Some(path),
            token: RwLock::new(token),
        }
    }

    pub fn get(&self) -> Option<String> {
        self.token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.get().is_some()
    }

    /// Store a new token, persisting it when file-backed.
    pub fn set(&self, token: impl Into<String>) -> Result<()> {
        let token = token.into();
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let payload = serde_json::to_vec(&PersistedToken { token: token.clone() })
                .unwrap_or_default();
            std::fs::write(path, payload)?;
        }
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = Some(token);
        Ok(())
    }

    /// Drop the token from memory and disk.
    pub fn clear(&self) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = None;
        if let Some(path) = &self.path {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(error = %e, "failed to remove persisted token");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_set_get_clear() {
        let store = TokenStore::in_memory();
        assert!(!store.is_authenticated());

        store.set("abc").unwrap();
        assert_eq!(store.get(), Some("abc".to_string()));

        store.clear();
        assert!(store.get().is_none());
    }

    #[test]
    fn file_backed_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth/token.json");

        let store = TokenStore::open(&path);
        store.set("persisted").unwrap();
        drop(store);

        let reopened = TokenStore::open(&path);
        assert_eq!(reopened.get(), Some("persisted".to_string()));

        reopened.clear();
        let cleared = TokenStore::open(&path);
        assert!(cleared.get().is_none());
    }
}
