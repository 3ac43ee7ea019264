//! Common utilities and types shared across SpendSync modules.
//!
//! This module provides foundational types used throughout the codebase:
//! the error taxonomy, the expense record, and tolerant date handling for
//! wire payloads.

pub mod dates;
pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{new_local_id, Category, Expense, ExpenseDraft};
