//! Durable local storage for SpendSync.
//!
//! Persists expense records in SQLite with per-record sync-state tracking
//! (dirty flag via nullable `synced_at`, soft-delete tombstones) and owns
//! the persisted sync cursor.

pub mod store;

pub use store::{LocalStore, StoredExpense};
