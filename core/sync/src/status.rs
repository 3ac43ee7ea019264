//! Observable sync lifecycle state.

use std::fmt;

/// Where the engine currently is in its lifecycle.
///
/// `Success` and `Failed` persist until the next pass starts, so UI can
/// show the outcome of the last run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Success,
    Failed(String),
    /// Offline when a pass was requested; nothing was attempted.
    Offline,
}

impl SyncStatus {
    pub fn is_syncing(&self) -> bool {
        matches!(self, SyncStatus::Syncing)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Idle => f.write_str("idle"),
            SyncStatus::Syncing => f.write_str("syncing"),
            SyncStatus::Success => f.write_str("success"),
            SyncStatus::Failed(msg) => write!(f, "failed: {msg}"),
            SyncStatus::Offline => f.write_str("offline"),
        }
    }
}
