//! Application layer for SpendSync: the repository facade over store,
//! cache, network, and sync, plus configuration and the composition root.

pub mod config;
pub mod context;
pub mod events;
pub mod repository;

pub use config::AppConfig;
pub use context::AppContext;
pub use events::{ChangeEvent, ChangeNotifier};
pub use repository::{ExpenseRepository, LoadOutcome};
