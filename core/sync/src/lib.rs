//! Offline-first sync engine for SpendSync.
//!
//! [`SyncEngine`] runs upload-then-download passes, [`SyncScheduler`]
//! drives them in the background, and [`SyncStatus`] is the observable
//! lifecycle the UI watches.

pub mod engine;
pub mod scheduler;
pub mod status;

pub use engine::{SyncEngine, SyncStats};
pub use scheduler::SyncScheduler;
pub use status::SyncStatus;
