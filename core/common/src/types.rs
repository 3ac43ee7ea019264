//! Core domain types shared across SpendSync modules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// The central expense record.
///
/// `synced_at == None` means the record exists locally but has never been
/// confirmed synced to the server — it is *dirty* and sits in the upload
/// queue. Server-side records always carry a non-None `synced_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    /// Globally unique id. Server-assigned once synced; a client-generated
    /// UUID while offline.
    pub id: String,
    pub title: String,
    pub amount: f64,
    /// Stored as free text; [`Category`] enumerates the canonical set.
    pub category: String,
    /// ISO-like currency code, e.g. "USD".
    pub currency: String,
    #[serde(with = "crate::dates::flexible")]
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Last confirmed sync time; `None` = pending upload.
    #[serde(
        default,
        with = "crate::dates::flexible_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub synced_at: Option<DateTime<Utc>>,
}

impl Expense {
    /// Whether this record is pending upload.
    pub fn is_dirty(&self) -> bool {
        self.synced_at.is_none()
    }
}

/// User-provided fields for creating or editing an expense.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseDraft {
    pub title: String,
    pub amount: f64,
    pub category: String,
    pub currency: String,
    pub date: DateTime<Utc>,
    pub description: Option<String>,
}

impl ExpenseDraft {
    /// Validate the draft before it reaches the store or the wire.
    ///
    /// # Errors
    /// - Empty or whitespace-only title
    /// - Non-positive or non-finite amount
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::InvalidRequest("title cannot be empty".to_string()));
        }
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(Error::InvalidRequest(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}

/// Canonical expense categories.
///
/// Records store the category as free text, so unknown strings map to
/// [`Category::Other`] rather than failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Food,
    Transport,
    Shopping,
    Entertainment,
    Bills,
    Health,
    Other,
}

impl Category {
    /// All categories, in display order.
    pub const ALL: [Category; 7] = [
        Category::Food,
        Category::Transport,
        Category::Shopping,
        Category::Entertainment,
        Category::Bills,
        Category::Health,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Food => "Food",
            Category::Transport => "Transport",
            Category::Shopping => "Shopping",
            Category::Entertainment => "Entertainment",
            Category::Bills => "Bills",
            Category::Health => "Health",
            Category::Other => "Other",
        }
    }

    /// Parse free text, case-insensitively, defaulting to `Other`.
    pub fn parse(s: &str) -> Category {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .unwrap_or(Category::Other)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generate a fresh client-side record id.
pub fn new_local_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> ExpenseDraft {
        ExpenseDraft {
            title: "Coffee".to_string(),
            amount: 4.50,
            category: "Food".to_string(),
            currency: "USD".to_string(),
            date: Utc::now(),
            description: None,
        }
    }

    #[test]
    fn draft_validation() {
        assert!(draft().validate().is_ok());

        let mut d = draft();
        d.title = "   ".to_string();
        assert!(d.validate().is_err());

        let mut d = draft();
        d.amount = 0.0;
        assert!(d.validate().is_err());

        let mut d = draft();
        d.amount = f64::NAN;
        assert!(d.validate().is_err());
    }

    #[test]
    fn category_parsing() {
        assert_eq!(Category::parse("food"), Category::Food);
        assert_eq!(Category::parse(" Transport "), Category::Transport);
        assert_eq!(Category::parse("Groceries"), Category::Other);
    }

    #[test]
    fn expense_wire_roundtrip() {
        let expense = Expense {
            id: "abc".to_string(),
            title: "Coffee".to_string(),
            amount: 4.5,
            category: "Food".to_string(),
            currency: "USD".to_string(),
            date: "2026-03-01T12:00:00Z".parse().unwrap(),
            description: Some("morning".to_string()),
            synced_at: None,
        };

        let json = serde_json::to_string(&expense).unwrap();
        // Dirty records omit syncedAt entirely.
        assert!(!json.contains("syncedAt"));

        let back: Expense = serde_json::from_str(&json).unwrap();
        assert_eq!(back, expense);
    }

    #[test]
    fn expense_decodes_mixed_date_formats() {
        let json = r#"{
            "id": "1",
            "title": "Lunch",
            "amount": 12.0,
            "category": "Food",
            "currency": "USD",
            "date": "2026-03-01 13:00:00",
            "syncedAt": 1700000000
        }"#;

        let expense: Expense = serde_json::from_str(json).unwrap();
        assert!(!expense.is_dirty());
        assert_eq!(expense.synced_at.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn local_ids_are_unique() {
        assert_ne!(new_local_id(), new_local_id());
    }
}
