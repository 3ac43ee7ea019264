//! Network transport for SpendSync.
//!
//! [`ApiClient`] owns the request contract (connectivity gate, bearer
//! auth, retries, error taxonomy); [`ExpenseApi`] is the typed surface
//! the rest of the system talks to, with [`HttpApi`] for production and
//! [`MemoryApi`] for tests.

pub mod api;
pub mod client;
pub mod connectivity;
pub mod memory;
pub mod token;
pub mod wire;

pub use api::{ExpenseApi, HttpApi, ListQuery};
pub use client::ApiClient;
pub use connectivity::ConnectivityMonitor;
pub use memory::MemoryApi;
pub use token::TokenStore;
